//! Classifier service: scores unlabelled records with the newest model

use crate::config::ClassifierConfig;
use crate::features::FeatureMatrix;
use crate::model::ModelSnapshot;
use activestream_core::{
    Classification, Error, Filter, Mailbox, ModelStamp, Query, Record, RecordId, RecordUpdate,
    Result, SharedStore, StopToken,
};
use activestream_telemetry::PipelineStats;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Score a batch with one snapshot, producing guarded classification writes
pub fn score_records(
    snapshot: &ModelSnapshot,
    records: &[Record],
) -> Result<Vec<(RecordId, RecordUpdate)>> {
    let features = FeatureMatrix::align_batch(records, snapshot.model.width());
    let probabilities = snapshot.score(&features)?;
    Ok(records
        .iter()
        .zip(probabilities)
        .map(|(record, p)| {
            (
                record.id.clone(),
                RecordUpdate::classification(Classification::from_probability(p), snapshot.version),
            )
        })
        .collect())
}

pub struct ClassifierService {
    store: SharedStore,
    models: Arc<Mailbox<ModelSnapshot>>,
    config: ClassifierConfig,
    stats: PipelineStats,
    current: ModelSnapshot,
}

impl ClassifierService {
    /// Starts on the version 0 baseline until a trained model arrives
    pub fn new(
        store: SharedStore,
        models: Arc<Mailbox<ModelSnapshot>>,
        config: ClassifierConfig,
        stats: PipelineStats,
    ) -> Self {
        Self {
            store,
            models,
            config,
            stats,
            current: ModelSnapshot::baseline(),
        }
    }

    pub fn current_version(&self) -> u64 {
        self.current.version
    }

    /// Swap in a published model if one is waiting
    pub fn adopt_pending(&mut self) -> bool {
        match self.models.take() {
            Some(snapshot) => self.adopt(snapshot),
            None => false,
        }
    }

    fn adopt(&mut self, snapshot: ModelSnapshot) -> bool {
        if snapshot.version <= self.current.version {
            warn!(
                offered = snapshot.version,
                current = self.current.version,
                "Ignoring stale model"
            );
            return false;
        }
        info!(
            version = snapshot.version,
            model = snapshot.model.name(),
            width = snapshot.model.width(),
            trained_on = snapshot.trained_on,
            "Adopted model, rescoring unlabelled records"
        );
        self.current = snapshot;
        self.stats.set_model_version(self.current.version);
        true
    }

    /// Score one batch of unlabelled records the current model has not seen.
    /// Returns the number of records scored.
    pub async fn classify_pending(&self) -> Result<usize> {
        let query = Query::new(
            Filter::unlabelled().stamp_below(ModelStamp::Version(self.current.version)),
        )
        .limit(self.config.batch_size);
        let records = self.store.find(&query).await?;
        if records.is_empty() {
            return Ok(0);
        }

        let started = Instant::now();
        let snapshot = self.current.clone();
        let (count, updates) = tokio::task::spawn_blocking(move || {
            score_records(&snapshot, &records).map(|updates| (records.len(), updates))
        })
        .await
        .map_err(|e| Error::internal(format!("scoring task failed: {}", e)))??;

        let result = self.store.bulk_update(updates).await?;
        let latency_us = started.elapsed().as_micros() as u64;
        self.stats.record_classified(count, latency_us);
        debug!(
            count,
            modified = result.modified,
            version = self.current.version,
            latency_us,
            "Scored batch"
        );
        Ok(count)
    }

    pub async fn run(mut self, stop: StopToken) -> Result<()> {
        info!(batch_size = self.config.batch_size, "Classifier service ready");
        self.stats.set_model_version(self.current.version);
        let poll = self.config.poll_interval();

        while !stop.is_cancelled() {
            self.adopt_pending();
            match self.classify_pending().await {
                Ok(0) => {
                    let published = tokio::select! {
                        _ = stop.cancelled() => break,
                        snapshot = self.models.recv_timeout(poll) => snapshot,
                    };
                    if let Some(snapshot) = published {
                        self.adopt(snapshot);
                    }
                }
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Scoring failed, retrying");
                    if activestream_core::sleep_or_stop(&stop, poll).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, version = self.current.version, "Classifier service failed");
                    return Err(e);
                }
            }
        }
        info!("Classifier service stopped");
        Ok(())
    }
}
