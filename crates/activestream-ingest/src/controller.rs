//! Ingestion controller worker

use crate::pacer::ReconnectPacer;
use crate::source::{Amender, SourceEvent, StreamSource};
use activestream_core::{Error, Record, Result, SharedKeywords, StopToken};
use activestream_telemetry::PipelineStats;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Keyword change requested through the annotation channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRequest {
    pub word: String,
    pub action: KeywordAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordAction {
    Add,
    Remove,
}

impl KeywordRequest {
    pub fn add(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            action: KeywordAction::Add,
        }
    }

    pub fn remove(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            action: KeywordAction::Remove,
        }
    }
}

/// Sources waiting for a (re)connect
#[derive(Debug, Clone, Copy)]
struct Pending {
    tracked: bool,
    sample: bool,
}

impl Pending {
    fn all(with_sample: bool) -> Self {
        Self {
            tracked: true,
            sample: with_sample,
        }
    }

    fn any(&self) -> bool {
        self.tracked || self.sample
    }

    fn mark(&mut self, amender: Amender) {
        match amender {
            Amender::Tracked => self.tracked = true,
            Amender::Sample => self.sample = true,
        }
    }
}

enum Step {
    Stop,
    Reconnect,
    Request(Option<KeywordRequest>),
    Line(Amender, Option<Result<String>>),
}

/// Owns the stream connections and feeds the feature extractor queue
pub struct IngestionController {
    keywords: SharedKeywords,
    requests: mpsc::Receiver<KeywordRequest>,
    requests_open: bool,
    output: mpsc::Sender<Record>,
    tracked: StreamSource,
    sample: Option<StreamSource>,
    pacer: ReconnectPacer,
    stats: PipelineStats,
}

impl IngestionController {
    pub fn new(
        tracked: StreamSource,
        keywords: SharedKeywords,
        requests: mpsc::Receiver<KeywordRequest>,
        output: mpsc::Sender<Record>,
        pacer: ReconnectPacer,
        stats: PipelineStats,
    ) -> Self {
        Self {
            keywords,
            requests,
            requests_open: true,
            output,
            tracked,
            sample: None,
            pacer,
            stats,
        }
    }

    /// Also connect a background sample stream
    pub fn with_sample(mut self, sample: StreamSource) -> Self {
        self.sample = Some(sample);
        self
    }

    /// Run until stopped. Connections are closed on every exit path.
    pub async fn run(mut self, stop: StopToken) -> Result<()> {
        info!(
            keywords = ?self.keywords.read().active_words(),
            sample = self.sample.is_some(),
            "Ingestion controller ready"
        );
        let result = self.pump(&stop).await;
        self.disconnect_all();
        match &result {
            Ok(()) => info!("Ingestion controller stopped"),
            Err(e) => warn!(error = %e, "Ingestion controller failed"),
        }
        result
    }

    async fn pump(&mut self, stop: &StopToken) -> Result<()> {
        let mut pending = Pending::all(self.sample.is_some());
        while !stop.is_cancelled() {
            let due = self.pacer.remaining();
            let reconnect_due = pending.any();
            let requests_open = self.requests_open;
            let step = tokio::select! {
                biased;
                _ = stop.cancelled() => Step::Stop,
                request = self.requests.recv(), if requests_open => Step::Request(request),
                _ = tokio::time::sleep(due), if reconnect_due => Step::Reconnect,
                line = self.tracked.next_line() => Step::Line(Amender::Tracked, line),
                line = next_sample_line(&mut self.sample) => Step::Line(Amender::Sample, line),
            };

            match step {
                Step::Stop => break,
                Step::Reconnect => {
                    if self.pacer.wait(stop).await {
                        break;
                    }
                    // Fold requests that queued up while pacing into this connect
                    if self.drain_requests(Vec::new()) {
                        pending.tracked = true;
                    }
                    pending = self.reconnect(pending).await;
                }
                Step::Request(Some(first)) => {
                    if self.drain_requests(vec![first]) {
                        pending.tracked = true;
                    }
                }
                Step::Request(None) => {
                    debug!("Keyword request queue closed");
                    self.requests_open = false;
                }
                Step::Line(amender, None) => {
                    warn!(origin = amender.origin().as_str(), "Stream closed by remote end");
                    self.close_source(amender);
                    pending.mark(amender);
                }
                Step::Line(amender, Some(Err(e))) => {
                    warn!(origin = amender.origin().as_str(), error = %e, "Stream error");
                    self.close_source(amender);
                    pending.mark(amender);
                }
                Step::Line(amender, Some(Ok(line))) => {
                    if let Some(record) = self.handle_line(amender, &line) {
                        if !self.forward(record, stop).await? {
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply `batch` plus every request already queued. Returns true if the
    /// active keyword set changed.
    fn drain_requests(&mut self, mut batch: Vec<KeywordRequest>) -> bool {
        while let Ok(request) = self.requests.try_recv() {
            batch.push(request);
        }
        if batch.is_empty() {
            return false;
        }

        let mut keywords = self.keywords.write();
        let mut changed = false;
        for request in &batch {
            let applied = match request.action {
                KeywordAction::Add => keywords.add(request.word.as_str()),
                KeywordAction::Remove => keywords.remove(&request.word),
            };
            info!(word = %request.word, action = ?request.action, applied, "Keyword request");
            changed |= applied;
        }
        if changed {
            info!(keywords = ?keywords.active_words(), "Keyword set changed, reconnecting");
        }
        changed
    }

    /// Connect the sources in `pending`, leaving healthy connections alone.
    /// Returns the sources that still need a connection.
    async fn reconnect(&mut self, mut pending: Pending) -> Pending {
        let keywords = self.keywords.read().active_words();
        self.stats.record_reconnect();

        if pending.tracked {
            match self.tracked.connect(&keywords).await {
                Ok(()) => pending.tracked = false,
                Err(e) => warn!(error = %e, "Tracked stream connection failed"),
            }
        }
        if pending.sample {
            match self.sample.as_mut() {
                Some(sample) => match sample.connect(&keywords).await {
                    Ok(()) => pending.sample = false,
                    Err(e) => warn!(error = %e, "Sample stream connection failed"),
                },
                None => pending.sample = false,
            }
        }
        if pending.any() {
            self.pacer.record_failure();
            debug!(
                tracked = pending.tracked,
                sample = pending.sample,
                pause_ms = self.pacer.pause().as_millis() as u64,
                "Retrying failed connections after backoff"
            );
        }
        pending
    }

    fn close_source(&mut self, amender: Amender) {
        let source = match amender {
            Amender::Tracked => &mut self.tracked,
            Amender::Sample => match self.sample.as_mut() {
                Some(sample) => sample,
                None => return,
            },
        };
        if source.delivered() > 0 {
            self.pacer.record_success();
        } else {
            self.pacer.record_failure();
        }
        source.disconnect();
    }

    fn disconnect_all(&mut self) {
        self.tracked.disconnect();
        if let Some(sample) = self.sample.as_mut() {
            sample.disconnect();
        }
    }

    fn handle_line(&mut self, amender: Amender, line: &str) -> Option<Record> {
        let source = match amender {
            Amender::Tracked => &mut self.tracked,
            Amender::Sample => self.sample.as_mut()?,
        };
        match source.on_line(line) {
            Ok(SourceEvent::Record(record)) => Some(record),
            Ok(SourceEvent::Missed(count)) => {
                if count > 0 {
                    debug!(count, "Rate limited");
                    self.stats.record_missed(count);
                }
                None
            }
            Ok(SourceEvent::Filtered) => {
                self.stats.record_filtered();
                None
            }
            Ok(SourceEvent::Ignored) => None,
            Err(e) => {
                warn!(error = %e, "Skipping malformed stream message");
                None
            }
        }
    }

    /// Enqueue for the feature extractor, blocking while the queue is full.
    /// Returns false if stopped first.
    async fn forward(&mut self, record: Record, stop: &StopToken) -> Result<bool> {
        let origin = record.origin;
        tokio::select! {
            _ = stop.cancelled() => Ok(false),
            sent = self.output.send(record) => match sent {
                Ok(()) => {
                    self.stats.record_ingested(origin);
                    Ok(true)
                }
                Err(_) => Err(Error::internal("feature extractor queue closed")),
            },
        }
    }
}

async fn next_sample_line(sample: &mut Option<StreamSource>) -> Option<Result<String>> {
    match sample.as_mut() {
        Some(source) => source.next_line().await,
        None => std::future::pending().await,
    }
}
