//! Configuration for feature extraction, classification and training

use crate::logistic::LogisticConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Feature extractor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Stopwords added to the built-in English list
    #[serde(default)]
    pub extra_stopwords: Vec<String>,

    /// Shorter tokens are dropped
    #[serde(default = "default_min_token_chars")]
    pub min_token_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            extra_stopwords: Vec::new(),
            min_token_chars: default_min_token_chars(),
        }
    }
}

/// Classifier service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Records scored per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause when nothing is left to score
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl ClassifierConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Trainer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Number of top features reported per model
    #[serde(default = "default_top_features")]
    pub top_features: usize,

    /// Terms never reported as top features, on top of the tracked keywords
    #[serde(default = "default_feature_stopwords")]
    pub feature_stopwords: Vec<String>,

    /// How often the idle trainer re-checks the stop token
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub logistic: LogisticConfig,
}

impl TrainerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            top_features: default_top_features(),
            feature_stopwords: default_feature_stopwords(),
            poll_interval_ms: default_poll_interval_ms(),
            logistic: LogisticConfig::default(),
        }
    }
}

fn default_min_token_chars() -> usize {
    2
}

fn default_batch_size() -> usize {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_top_features() -> usize {
    10
}

fn default_feature_stopwords() -> Vec<String> {
    [".", "-", ":", ";", "&", "amp", "rt", "via", "http", "https"]
        .iter()
        .map(|w| w.to_string())
        .collect()
}
