//! Annotation loop configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationConfig {
    /// Per-class label count that fires the first retrain
    #[serde(default = "default_base_threshold")]
    pub base_threshold: usize,

    /// Chance that a round is an evaluation round
    #[serde(default = "default_evaluation_probability")]
    pub evaluation_probability: f64,

    /// How long one wait for a verdict lasts before the stop token is re-checked
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Pause when nothing is eligible for review
    #[serde(default = "default_idle_pause_ms")]
    pub idle_pause_ms: u64,

    /// Fixed seed for reproducible round sampling
    #[serde(default)]
    pub seed: Option<u64>,
}

impl AnnotationConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn idle_pause(&self) -> Duration {
        Duration::from_millis(self.idle_pause_ms)
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            base_threshold: default_base_threshold(),
            evaluation_probability: default_evaluation_probability(),
            response_timeout_ms: default_response_timeout_ms(),
            idle_pause_ms: default_idle_pause_ms(),
            seed: None,
        }
    }
}

fn default_base_threshold() -> usize {
    1
}

fn default_evaluation_probability() -> f64 {
    0.3
}

fn default_response_timeout_ms() -> u64 {
    1000
}

fn default_idle_pause_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: AnnotationConfig =
            serde_yaml::from_str("base_threshold: 5\nseed: 7\n").unwrap();
        assert_eq!(config.base_threshold, 5);
        assert_eq!(config.seed, Some(7));
        assert!((config.evaluation_probability - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.response_timeout(), Duration::from_secs(1));
    }
}
