//! Relevance model contract and versioned snapshots

use crate::features::FeatureMatrix;
use activestream_core::{Error, Result, DECISION_BOUNDARY};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// A fitted relevance model
pub trait RelevanceModel: Send + Sync + fmt::Debug {
    /// Model name for logs
    fn name(&self) -> &str;

    /// Number of feature columns the model was fitted on
    fn width(&self) -> usize;

    /// Probability of relevance for every row. `features` must already be
    /// aligned to [`RelevanceModel::width`].
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;

    /// Per-feature weights, one per column
    fn weights(&self) -> &[f64];
}

/// Fits a fresh model from a full labelled set
pub trait ModelTrainer: Send + Sync {
    fn fit(&self, features: &FeatureMatrix, targets: &[bool]) -> Result<Arc<dyn RelevanceModel>>;
}

/// Answers the same probability for every row
#[derive(Debug, Clone)]
pub struct ConstantModel {
    probability: f64,
}

impl ConstantModel {
    pub fn new(probability: f64) -> Self {
        Self { probability }
    }
}

impl Default for ConstantModel {
    fn default() -> Self {
        Self::new(DECISION_BOUNDARY)
    }
}

impl RelevanceModel for ConstantModel {
    fn name(&self) -> &str {
        "constant"
    }

    fn width(&self) -> usize {
        0
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(vec![self.probability; features.n_rows()])
    }

    fn weights(&self) -> &[f64] {
        &[]
    }
}

/// Immutable model published by the trainer
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    /// 0 means no trained model yet
    pub version: u64,
    pub model: Arc<dyn RelevanceModel>,
    /// Most discriminative terms at training time
    pub top_features: Vec<String>,
    /// Labelled records the model was fitted on
    pub trained_on: usize,
    pub created_at: DateTime<Utc>,
}

impl ModelSnapshot {
    /// Version 0 placeholder scoring everything at the decision boundary
    pub fn baseline() -> Self {
        Self {
            version: 0,
            model: Arc::new(ConstantModel::default()),
            top_features: Vec::new(),
            trained_on: 0,
            created_at: Utc::now(),
        }
    }

    /// Score an aligned matrix, checking the model kept its contract
    pub fn score(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if features.width() != self.model.width() {
            return Err(Error::invariant(format!(
                "feature width {} does not match model width {}",
                features.width(),
                self.model.width()
            )));
        }
        let probabilities = self.model.predict_proba(features)?;
        if probabilities.len() != features.n_rows() {
            return Err(Error::invariant(format!(
                "model {} returned {} probabilities for {} rows",
                self.model.name(),
                probabilities.len(),
                features.n_rows()
            )));
        }
        if let Some(p) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(Error::invariant(format!(
                "model {} returned probability {} outside [0, 1]",
                self.model.name(),
                p
            )));
        }
        Ok(probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use activestream_core::BagOfTerms;

    #[test]
    fn test_baseline_scores_at_boundary() {
        let snapshot = ModelSnapshot::baseline();
        let features = FeatureMatrix::from_bags(&[BagOfTerms::new(), BagOfTerms::new()], 0);
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.score(&features).unwrap(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_score_rejects_misaligned_features() {
        let snapshot = ModelSnapshot::baseline();
        let features = FeatureMatrix::empty(3);
        assert!(matches!(snapshot.score(&features), Err(Error::Invariant(_))));
    }

    #[test]
    fn test_score_rejects_out_of_range_probabilities() {
        let snapshot = ModelSnapshot {
            model: Arc::new(ConstantModel::new(1.5)),
            ..ModelSnapshot::baseline()
        };
        let features = FeatureMatrix::from_bags(&[BagOfTerms::new()], 0);
        assert!(matches!(snapshot.score(&features), Err(Error::Invariant(_))));
    }
}
