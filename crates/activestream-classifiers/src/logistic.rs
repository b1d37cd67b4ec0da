//! L2-regularized logistic regression fitted by batch gradient descent

use crate::features::{sparse_dot, FeatureMatrix};
use crate::model::{ModelTrainer, RelevanceModel};
use activestream_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Fitting parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Upper bound on full passes over the data
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// L2 penalty on the weights (not the bias)
    #[serde(default = "default_l2")]
    pub l2: f64,

    /// Stop once the largest gradient component falls below this
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Weight classes inversely to their frequency
    #[serde(default = "default_true")]
    pub balance_classes: bool,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            epochs: default_epochs(),
            l2: default_l2(),
            tolerance: default_tolerance(),
            balance_classes: true,
        }
    }
}

fn default_learning_rate() -> f64 {
    0.5
}

fn default_epochs() -> usize {
    300
}

fn default_l2() -> f64 {
    1e-3
}

fn default_tolerance() -> f64 {
    1e-5
}

fn default_true() -> bool {
    true
}

/// Fitted logistic regression
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticRegression {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    fn probability(&self, row: &[(usize, f64)]) -> f64 {
        sigmoid(self.bias + sparse_dot(row, &self.weights))
    }
}

impl RelevanceModel for LogisticRegression {
    fn name(&self) -> &str {
        "logistic_regression"
    }

    fn width(&self) -> usize {
        self.weights.len()
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(features.rows().map(|row| self.probability(row)).collect())
    }

    fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// Fits [`LogisticRegression`] models
#[derive(Debug, Clone, Default)]
pub struct LogisticTrainer {
    config: LogisticConfig,
}

impl LogisticTrainer {
    pub fn new(config: LogisticConfig) -> Self {
        Self { config }
    }

    pub fn fit_logistic(&self, features: &FeatureMatrix, targets: &[bool]) -> Result<LogisticRegression> {
        let n = features.n_rows();
        if n == 0 {
            return Err(Error::classifier("cannot fit on an empty training set"));
        }
        if targets.len() != n {
            return Err(Error::classifier(format!(
                "{} targets for {} training rows",
                targets.len(),
                n
            )));
        }
        let positives = targets.iter().filter(|&&t| t).count();
        if positives == 0 || positives == n {
            return Err(Error::classifier("training set needs both classes"));
        }

        let (positive_weight, negative_weight) = if self.config.balance_classes {
            (
                n as f64 / (2.0 * positives as f64),
                n as f64 / (2.0 * (n - positives) as f64),
            )
        } else {
            (1.0, 1.0)
        };
        let sample_weights: Vec<f64> = targets
            .iter()
            .map(|&t| if t { positive_weight } else { negative_weight })
            .collect();
        let total_weight: f64 = sample_weights.iter().sum();

        let mut model = LogisticRegression::new(vec![0.0; features.width()], 0.0);
        let mut gradient = vec![0.0; features.width()];
        let rate = self.config.learning_rate;

        for epoch in 0..self.config.epochs {
            gradient.iter_mut().for_each(|g| *g = 0.0);
            let mut bias_gradient = 0.0;

            for ((row, &target), &weight) in features.rows().zip(targets).zip(&sample_weights) {
                let error = (model.probability(row) - if target { 1.0 } else { 0.0 }) * weight;
                for &(column, value) in row {
                    gradient[column] += error * value;
                }
                bias_gradient += error;
            }

            let mut largest = (bias_gradient / total_weight).abs();
            for (w, g) in model.weights.iter_mut().zip(&gradient) {
                let step = g / total_weight + self.config.l2 * *w;
                largest = largest.max(step.abs());
                *w -= rate * step;
            }
            model.bias -= rate * bias_gradient / total_weight;

            if largest < self.config.tolerance {
                debug!(epoch, "Logistic regression converged");
                break;
            }
        }

        Ok(model)
    }
}

impl ModelTrainer for LogisticTrainer {
    fn fit(&self, features: &FeatureMatrix, targets: &[bool]) -> Result<Arc<dyn RelevanceModel>> {
        Ok(Arc::new(self.fit_logistic(features, targets)?))
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use activestream_core::BagOfTerms;

    fn bag(terms: &[u32]) -> BagOfTerms {
        terms.iter().map(|&t| (t, 1)).collect()
    }

    #[test]
    fn test_separable_data_is_learned() {
        // Term 0 marks relevant rows, term 1 irrelevant ones, term 2 is noise
        let bags = vec![
            bag(&[0, 2]),
            bag(&[0]),
            bag(&[0, 2]),
            bag(&[1, 2]),
            bag(&[1]),
            bag(&[1]),
        ];
        let targets = [true, true, true, false, false, false];
        let features = FeatureMatrix::from_bags(&bags, 3);

        let model = LogisticTrainer::default()
            .fit_logistic(&features, &targets)
            .unwrap();
        assert_eq!(model.width(), 3);
        assert!(model.weights()[0] > 0.5);
        assert!(model.weights()[1] < -0.5);
        assert!(model.weights()[2].abs() < model.weights()[0].abs());

        let probabilities = model.predict_proba(&features).unwrap();
        for (p, &t) in probabilities.iter().zip(&targets) {
            assert_eq!(*p >= 0.5, t, "p = {}", p);
        }
    }

    #[test]
    fn test_class_balancing_offsets_majority() {
        let mut bags = vec![bag(&[0])];
        bags.extend((0..9).map(|_| bag(&[1])));
        let mut targets = vec![true];
        targets.extend([false; 9]);
        let features = FeatureMatrix::from_bags(&bags, 2);

        let balanced = LogisticTrainer::default()
            .fit_logistic(&features, &targets)
            .unwrap();
        let unbalanced = LogisticTrainer::new(LogisticConfig {
            balance_classes: false,
            ..Default::default()
        })
        .fit_logistic(&features, &targets)
        .unwrap();
        assert!(balanced.bias() > unbalanced.bias());
    }

    #[test]
    fn test_fit_rejects_degenerate_sets() {
        let trainer = LogisticTrainer::default();
        let features = FeatureMatrix::from_bags(&[bag(&[0]), bag(&[0])], 1);
        assert!(matches!(
            trainer.fit_logistic(&features, &[true, true]),
            Err(Error::Classifier(_))
        ));
        assert!(trainer.fit_logistic(&FeatureMatrix::empty(1), &[]).is_err());
        assert!(trainer.fit_logistic(&features, &[true]).is_err());
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(-1000.0) >= 0.0);
        assert!(sigmoid(1000.0) <= 1.0);
    }
}
