//! Trainer worker: refits the relevance model when enough labels arrive

use crate::config::TrainerConfig;
use crate::features::FeatureMatrix;
use crate::logistic::LogisticTrainer;
use crate::model::{ModelSnapshot, ModelTrainer};
use activestream_core::{
    Error, Event, Filter, Mailbox, Query, Result, SharedKeywords, SharedStore, SharedVocabulary,
    StopToken, TermId,
};
use activestream_telemetry::PipelineStats;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct Trainer {
    store: SharedStore,
    vocabulary: SharedVocabulary,
    keywords: SharedKeywords,
    trigger: Arc<Event>,
    models: Arc<Mailbox<ModelSnapshot>>,
    features: Arc<Mailbox<Vec<String>>>,
    fitter: Arc<dyn ModelTrainer>,
    config: TrainerConfig,
    stats: PipelineStats,
    version: u64,
}

impl Trainer {
    pub fn new(
        store: SharedStore,
        vocabulary: SharedVocabulary,
        keywords: SharedKeywords,
        trigger: Arc<Event>,
        models: Arc<Mailbox<ModelSnapshot>>,
        config: TrainerConfig,
        stats: PipelineStats,
    ) -> Self {
        let fitter = Arc::new(LogisticTrainer::new(config.logistic.clone()));
        Self {
            store,
            vocabulary,
            keywords,
            trigger,
            models,
            features: Arc::new(Mailbox::new()),
            fitter,
            config,
            stats,
            version: 0,
        }
    }

    /// Publish top features to a shared board as well
    pub fn with_feature_board(mut self, features: Arc<Mailbox<Vec<String>>>) -> Self {
        self.features = features;
        self
    }

    /// Replace the fitting algorithm
    pub fn with_fitter(mut self, fitter: Arc<dyn ModelTrainer>) -> Self {
        self.fitter = fitter;
        self
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Fit on every labelled record and publish the result as the next version
    pub async fn train_once(&mut self) -> Result<ModelSnapshot> {
        let records = self.store.find(&Query::new(Filter::training())).await?;
        let width = self.vocabulary.size();
        let targets: Vec<bool> = records
            .iter()
            .filter_map(|r| r.manual_relevant.and_then(|label| label.target()))
            .collect();
        if targets.len() != records.len() {
            return Err(Error::invariant(format!(
                "training query returned {} records but only {} carry a relevance label",
                records.len(),
                targets.len()
            )));
        }

        let trained_on = records.len();
        let features = FeatureMatrix::from_bags(records.iter().map(|r| &r.bag), width);
        let fitter = Arc::clone(&self.fitter);
        let started = Instant::now();
        let model = tokio::task::spawn_blocking(move || fitter.fit(&features, &targets))
            .await
            .map_err(|e| Error::internal(format!("training task failed: {}", e)))??;

        self.version += 1;
        let top_features = self.top_features(model.weights());
        let snapshot = ModelSnapshot {
            version: self.version,
            model,
            top_features: top_features.clone(),
            trained_on,
            created_at: Utc::now(),
        };

        if self.models.publish(snapshot.clone()) {
            debug!("Replaced a model the classifier had not picked up yet");
        }
        self.features.publish(top_features);
        self.stats.record_retrain();
        info!(
            version = self.version,
            trained_on,
            width,
            elapsed_ms = started.elapsed().as_millis() as u64,
            top_features = ?snapshot.top_features,
            "Published model"
        );
        Ok(snapshot)
    }

    /// Highest-weighted terms, skipping stopwords and tracked keywords.
    /// Ties keep the lower term id first.
    pub fn top_features(&self, weights: &[f64]) -> Vec<String> {
        let mut excluded: HashSet<String> = self
            .config
            .feature_stopwords
            .iter()
            .map(|w| w.to_lowercase())
            .collect();
        for keyword in self.keywords.read().iter().filter(|k| k.active) {
            let word = keyword.word.to_lowercase();
            excluded.insert(format!("#{}", word));
            excluded.insert(word);
        }

        let mut order: Vec<usize> = (0..weights.len()).collect();
        order.sort_by(|&a, &b| {
            weights[b]
                .partial_cmp(&weights[a])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });

        order
            .into_iter()
            .filter_map(|column| self.vocabulary.token_for(column as TermId))
            .filter(|token| !excluded.contains(&token.to_lowercase()))
            .take(self.config.top_features)
            .collect()
    }

    pub async fn run(mut self, stop: StopToken) -> Result<()> {
        info!("Trainer ready");
        let poll = self.config.poll_interval();

        while !stop.is_cancelled() {
            let triggered = tokio::select! {
                _ = stop.cancelled() => break,
                triggered = self.trigger.wait_timeout(poll) => triggered,
            };
            if !triggered {
                continue;
            }
            // Cleared before fitting so labels committed meanwhile raise it again
            self.trigger.clear();

            match self.train_once().await {
                Ok(_) => {}
                Err(e @ Error::Invariant(_)) => {
                    error!(error = %e, "Trainer failed");
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "Training round skipped"),
            }
        }
        info!(version = self.version, "Trainer stopped");
        Ok(())
    }
}
