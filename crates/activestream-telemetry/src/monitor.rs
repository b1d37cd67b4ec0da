//! Periodic status reporting

use crate::confusion::ConfusionCounters;
use crate::stats::PipelineStats;
use activestream_core::{
    EventBus, Filter, Mailbox, ManualLabel, OutboundEvent, Result, SharedKeywords, SharedStore,
    StatusReport, StopToken,
};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Time between status reports
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

fn default_interval_ms() -> u64 {
    1000
}

/// Most recent status report, readable without subscribing to the bus
#[derive(Debug, Default)]
pub struct StatusBoard {
    latest: RwLock<Option<StatusReport>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, report: StatusReport) {
        *self.latest.write() = Some(report);
    }

    pub fn latest(&self) -> Option<StatusReport> {
        self.latest.read().clone()
    }
}

/// Aggregates pipeline state into status reports.
///
/// Reads from every other component and writes only to the event bus and
/// the status board.
pub struct Monitor {
    store: SharedStore,
    stats: PipelineStats,
    bus: Arc<EventBus>,
    config: MonitorConfig,
    confusion: Arc<ConfusionCounters>,
    features: Arc<Mailbox<Vec<String>>>,
    keywords: Option<SharedKeywords>,
    board: Arc<StatusBoard>,
    last_total: usize,
    top_features: Vec<String>,
}

impl Monitor {
    pub fn new(
        store: SharedStore,
        stats: PipelineStats,
        bus: Arc<EventBus>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            stats,
            bus,
            config,
            confusion: Arc::new(ConfusionCounters::new()),
            features: Arc::new(Mailbox::new()),
            keywords: None,
            board: Arc::new(StatusBoard::new()),
            last_total: 0,
            top_features: Vec::new(),
        }
    }

    /// Read evaluation outcomes from these counters
    pub fn with_confusion(mut self, confusion: Arc<ConfusionCounters>) -> Self {
        self.confusion = confusion;
        self
    }

    /// Pick up top features published by the trainer
    pub fn with_features(mut self, features: Arc<Mailbox<Vec<String>>>) -> Self {
        self.features = features;
        self
    }

    pub fn with_keywords(mut self, keywords: SharedKeywords) -> Self {
        self.keywords = Some(keywords);
        self
    }

    pub fn with_board(mut self, board: Arc<StatusBoard>) -> Self {
        self.board = board;
        self
    }

    /// Build one report from the current state
    pub async fn report(&mut self) -> Result<StatusReport> {
        let total = self.store.count(&Filter::all()).await?;
        let scored = self.store.count(&Filter::all().scored(true)).await?;
        let relevant = self
            .store
            .count(&Filter::label(ManualLabel::Relevant))
            .await?;
        let irrelevant = self
            .store
            .count(&Filter::label(ManualLabel::Irrelevant))
            .await?;
        let skipped = self
            .store
            .count(&Filter::label(ManualLabel::Skipped))
            .await?;

        if let Some(features) = self.features.take() {
            self.top_features = features;
        }

        let throughput = total.saturating_sub(self.last_total) as u64;
        self.last_total = total;

        let coverage_pct = if total == 0 {
            0.0
        } else {
            scored as f64 / total as f64 * 100.0
        };
        let quality = self.confusion.snapshot();
        let keywords = self
            .keywords
            .as_ref()
            .map(|k| k.read().active_words())
            .unwrap_or_default();

        Ok(StatusReport {
            timestamp: Utc::now(),
            throughput,
            missed_count: self.stats.missed(),
            coverage_pct,
            precision: quality.precision(),
            recall: quality.recall(),
            f1: quality.f1(),
            top_features: self.top_features.clone(),
            model_version: self.stats.model_version(),
            total_count: total,
            annotated_count: relevant + irrelevant + skipped,
            annotated_relevant: relevant,
            annotated_irrelevant: irrelevant,
            keywords,
        })
    }

    /// Report at a fixed interval until stopped
    pub async fn run(mut self, stop: StopToken) -> Result<()> {
        info!(interval_ms = self.config.interval_ms, "Monitor ready");
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.report().await {
                Ok(report) => {
                    debug!(
                        total = report.total_count,
                        throughput = report.throughput,
                        coverage = report.coverage_pct,
                        "Status report"
                    );
                    self.board.publish(report.clone());
                    self.bus.publish(OutboundEvent::StatusReport(report));
                }
                Err(e) if e.is_transient() => warn!(error = %e, "Status report failed"),
                Err(e) => return Err(e),
            }
        }

        info!("Monitor stopped");
        Ok(())
    }
}
