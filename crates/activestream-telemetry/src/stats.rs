//! Pipeline counters
//!
//! Every counter is mirrored to the `metrics` facade so the Prometheus
//! exporter sees it, and kept in-process so the monitor can read it.

use activestream_core::Origin;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared pipeline counters
#[derive(Clone)]
pub struct PipelineStats {
    inner: Arc<StatsInner>,
}

#[derive(Default)]
struct StatsInner {
    ingested: AtomicU64,
    filtered: AtomicU64,
    missed: AtomicU64,
    extracted: AtomicU64,
    classified: AtomicU64,
    annotations: AtomicU64,
    retrains: AtomicU64,
    reconnects: AtomicU64,
    model_version: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StatsInner::default()),
        }
    }

    /// A content item passed the inclusion filter and was enqueued
    pub fn record_ingested(&self, origin: Origin) {
        self.inner.ingested.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("activestream_records_ingested_total", "origin" => origin.as_str())
            .increment(1);
    }

    /// A content item was rejected by the inclusion filter
    pub fn record_filtered(&self) {
        self.inner.filtered.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("activestream_records_filtered_total").increment(1);
    }

    /// Documents the source dropped because of rate limiting
    pub fn record_missed(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.inner.missed.fetch_add(count, Ordering::Relaxed);
        metrics::counter!("activestream_missed_total").increment(count);
    }

    pub fn record_extracted(&self, vocabulary_size: usize) {
        self.inner.extracted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("activestream_records_extracted_total").increment(1);
        metrics::gauge!("activestream_vocabulary_size").set(vocabulary_size as f64);
    }

    /// A batch of records was scored
    pub fn record_classified(&self, count: usize, latency_us: u64) {
        self.inner
            .classified
            .fetch_add(count as u64, Ordering::Relaxed);
        metrics::counter!("activestream_records_classified_total").increment(count as u64);
        metrics::histogram!("activestream_classify_batch_latency_us").record(latency_us as f64);
    }

    pub fn record_annotation(&self, verdict: &'static str) {
        self.inner.annotations.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("activestream_annotations_total", "verdict" => verdict).increment(1);
    }

    pub fn record_retrain(&self) {
        self.inner.retrains.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("activestream_retrains_total").increment(1);
    }

    pub fn record_reconnect(&self) {
        self.inner.reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("activestream_reconnects_total").increment(1);
    }

    /// Version of the model the classifier service is using
    pub fn set_model_version(&self, version: u64) {
        self.inner.model_version.store(version, Ordering::Relaxed);
        metrics::gauge!("activestream_model_version").set(version as f64);
    }

    pub fn model_version(&self) -> u64 {
        self.inner.model_version.load(Ordering::Relaxed)
    }

    pub fn missed(&self) -> u64 {
        self.inner.missed.load(Ordering::Relaxed)
    }

    /// Get current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ingested: self.inner.ingested.load(Ordering::Relaxed),
            filtered: self.inner.filtered.load(Ordering::Relaxed),
            missed: self.inner.missed.load(Ordering::Relaxed),
            extracted: self.inner.extracted.load(Ordering::Relaxed),
            classified: self.inner.classified.load(Ordering::Relaxed),
            annotations: self.inner.annotations.load(Ordering::Relaxed),
            retrains: self.inner.retrains.load(Ordering::Relaxed),
            reconnects: self.inner.reconnects.load(Ordering::Relaxed),
            model_version: self.inner.model_version.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub ingested: u64,
    pub filtered: u64,
    pub missed: u64,
    pub extracted: u64,
    pub classified: u64,
    pub annotations: u64,
    pub retrains: u64,
    pub reconnects: u64,
    pub model_version: u64,
}

impl StatsSnapshot {
    /// Share of ingested items rejected by the inclusion filter
    pub fn filter_rate(&self) -> f64 {
        let seen = self.ingested + self.filtered;
        if seen == 0 {
            0.0
        } else {
            self.filtered as f64 / seen as f64
        }
    }
}
