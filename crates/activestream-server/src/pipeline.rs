//! Pipeline wiring and worker supervision

use crate::config::AppConfig;
use activestream_annotation::Annotator;
use activestream_classifiers::{
    ClassifierService, FeatureExtractor, ModelSnapshot, Trainer,
};
use activestream_core::{
    Error, Event, EventBus, KeywordSet, Mailbox, Result, SharedKeywords, SharedStore,
    SharedVocabulary, StopToken, Vocabulary,
};
use activestream_ingest::{
    Amender, HttpTransport, InclusionFilter, IngestConfig, IngestionController, KeywordRequest,
    ReconnectPacer, ReplayTransport, StreamSource, Transport,
};
use activestream_telemetry::{ConfusionCounters, Monitor, PipelineStats, StatusBoard};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Everything the annotation channel and the HTTP API need from a running
/// pipeline
#[derive(Clone)]
pub struct PipelineHandle {
    pub store: SharedStore,
    pub vocabulary: SharedVocabulary,
    pub keywords: SharedKeywords,
    pub bus: Arc<EventBus>,
    pub board: Arc<StatusBoard>,
    pub stats: PipelineStats,
    pub confusion: Arc<ConfusionCounters>,
    /// Raw verdict text for the annotation loop
    pub verdicts: Arc<Mailbox<String>>,
    pub keyword_requests: mpsc::Sender<KeywordRequest>,
    pub stop: StopToken,
}

type WorkerResult = (&'static str, Result<()>);

/// Running set of pipeline workers
pub struct Pipeline {
    handle: PipelineHandle,
    workers: JoinSet<WorkerResult>,
    shutdown_timeout: Duration,
}

impl Pipeline {
    /// Build every component and spawn one task per worker
    pub fn start(config: AppConfig, store: SharedStore) -> Result<Self> {
        config.validate()?;

        let stop = StopToken::new();
        let stats = PipelineStats::new();
        let vocabulary = Vocabulary::shared();
        let keywords = KeywordSet::from_seed(config.keywords.iter().cloned()).into_shared();
        let bus = Arc::new(EventBus::new(config.server.event_capacity));
        let board = Arc::new(StatusBoard::new());
        let confusion = Arc::new(ConfusionCounters::new());
        let verdicts = Arc::new(Mailbox::new());
        let models: Arc<Mailbox<ModelSnapshot>> = Arc::new(Mailbox::new());
        let features = Arc::new(Mailbox::new());
        let trigger = Arc::new(Event::new());

        let (record_tx, record_rx) = mpsc::channel(config.queue_capacity);
        let (request_tx, request_rx) = mpsc::channel(config.queue_capacity);

        let mut controller = IngestionController::new(
            tracked_source(&config.ingest, config.bearer_token.clone())?,
            Arc::clone(&keywords),
            request_rx,
            record_tx,
            ReconnectPacer::new(
                config.ingest.min_reconnect_pause(),
                config.ingest.max_backoff(),
            ),
            stats.clone(),
        );
        if let Some(sample) = sample_source(&config.ingest, config.bearer_token.clone())? {
            controller = controller.with_sample(sample);
        }

        let extractor = FeatureExtractor::new(
            &config.extractor,
            Arc::clone(&vocabulary),
            Arc::clone(&store),
            stats.clone(),
        )?;

        let classifier = ClassifierService::new(
            Arc::clone(&store),
            Arc::clone(&models),
            config.classifier.clone(),
            stats.clone(),
        );

        let trainer = Trainer::new(
            Arc::clone(&store),
            Arc::clone(&vocabulary),
            Arc::clone(&keywords),
            Arc::clone(&trigger),
            Arc::clone(&models),
            config.trainer.clone(),
            stats.clone(),
        )
        .with_feature_board(Arc::clone(&features));

        let annotator = Annotator::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&verdicts),
            Arc::clone(&trigger),
            config.annotation.clone(),
            stats.clone(),
        )
        .with_confusion(Arc::clone(&confusion))
        .with_keywords(Arc::clone(&keywords));

        let monitor = Monitor::new(
            Arc::clone(&store),
            stats.clone(),
            Arc::clone(&bus),
            config.monitor.clone(),
        )
        .with_confusion(Arc::clone(&confusion))
        .with_features(features)
        .with_keywords(Arc::clone(&keywords))
        .with_board(Arc::clone(&board));

        let mut workers = JoinSet::new();
        spawn_worker(&mut workers, "ingestion", controller.run(stop.clone()));
        spawn_worker(&mut workers, "extractor", extractor.run(record_rx, stop.clone()));
        spawn_worker(&mut workers, "classifier", classifier.run(stop.clone()));
        spawn_worker(&mut workers, "trainer", trainer.run(stop.clone()));
        spawn_worker(&mut workers, "annotator", annotator.run(stop.clone()));
        spawn_worker(&mut workers, "monitor", monitor.run(stop.clone()));
        info!(workers = workers.len(), "Pipeline started");

        Ok(Self {
            handle: PipelineHandle {
                store,
                vocabulary,
                keywords,
                bus,
                board,
                stats,
                confusion,
                verdicts,
                keyword_requests: request_tx,
                stop,
            },
            workers,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn stop_token(&self) -> StopToken {
        self.handle.stop.clone()
    }

    /// Watch workers until `shutdown` resolves or every worker has exited,
    /// then stop the rest. A failed worker is logged and the others keep
    /// running.
    pub async fn supervise<F>(mut self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut failed = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Shutdown requested, stopping workers");
                    break;
                }
                _ = self.handle.stop.cancelled() => break,
                joined = self.workers.join_next() => match joined {
                    Some(joined) => {
                        if !log_exit(joined) {
                            failed += 1;
                        }
                    }
                    None => {
                        info!("All workers exited");
                        break;
                    }
                },
            }
        }
        failed + self.shutdown().await
    }

    /// Cancel the stop token and join workers, aborting any that outlive
    /// the shutdown timeout. Returns the number of failed workers.
    pub async fn shutdown(mut self) -> usize {
        self.handle.stop.cancel();
        let mut failed = 0;
        let deadline = tokio::time::sleep(self.shutdown_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = self.workers.join_next() => match joined {
                    Some(joined) => {
                        if !log_exit(joined) {
                            failed += 1;
                        }
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    warn!(
                        remaining = self.workers.len(),
                        timeout_ms = self.shutdown_timeout.as_millis() as u64,
                        "Workers did not stop in time, aborting"
                    );
                    failed += self.workers.len();
                    self.workers.abort_all();
                    while self.workers.join_next().await.is_some() {}
                    break;
                }
            }
        }
        info!(failed, "Pipeline stopped");
        failed
    }
}

fn spawn_worker<F>(workers: &mut JoinSet<WorkerResult>, name: &'static str, worker: F)
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    workers.spawn(async move { (name, worker.await) });
}

/// Log a worker exit. Returns false for failures.
fn log_exit(joined: std::result::Result<WorkerResult, tokio::task::JoinError>) -> bool {
    match joined {
        Ok((name, Ok(()))) => {
            info!(worker = name, "Worker exited");
            true
        }
        Ok((name, Err(e))) => {
            error!(worker = name, error = %e, "Worker failed; the rest of the pipeline keeps running");
            false
        }
        Err(e) => {
            error!(error = %e, "Worker task panicked or was aborted");
            false
        }
    }
}

fn filter_for(config: &IngestConfig) -> InclusionFilter {
    InclusionFilter::new(config.drop_sensitive, &config.languages)
}

fn tracked_source(config: &IngestConfig, bearer_token: Option<String>) -> Result<StreamSource> {
    let transport: Arc<dyn Transport> = match &config.replay_file {
        Some(path) => {
            if !path.exists() {
                return Err(Error::config(format!(
                    "replay file {} does not exist",
                    path.display()
                )));
            }
            Arc::new(
                ReplayTransport::new(path.clone())
                    .with_pace(config.replay_pace())
                    .with_repeat(config.replay_repeat),
            )
        }
        None => Arc::new(
            HttpTransport::new(&config.filter_url, bearer_token)?
                .with_response_timeout(config.response_timeout()),
        ),
    };
    Ok(StreamSource::new(transport, Amender::Tracked, filter_for(config))
        .with_params(config.languages.clone(), config.locations.clone()))
}

fn sample_source(
    config: &IngestConfig,
    bearer_token: Option<String>,
) -> Result<Option<StreamSource>> {
    // A replay run has no live sample stream
    if config.replay_file.is_some() {
        return Ok(None);
    }
    let Some(url) = &config.sample_url else {
        return Ok(None);
    };
    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(url, bearer_token)?.with_response_timeout(config.response_timeout()),
    );
    Ok(Some(
        StreamSource::new(transport, Amender::Sample, filter_for(config))
            .with_params(config.languages.clone(), Vec::new()),
    ))
}
