//! Ingestion configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Streaming source and ingestion controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Keyword-filtered stream endpoint
    #[serde(default = "default_filter_url")]
    pub filter_url: String,

    /// Unfiltered sample stream; disabled when unset
    #[serde(default)]
    pub sample_url: Option<String>,

    /// Replay a recorded message file instead of connecting to `filter_url`
    #[serde(default)]
    pub replay_file: Option<PathBuf>,

    /// Delay between replayed lines
    #[serde(default)]
    pub replay_pace_ms: u64,

    /// Restart the replay file on every reconnect
    #[serde(default)]
    pub replay_repeat: bool,

    /// Accepted languages; empty accepts all
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Location bounding boxes, flattened
    #[serde(default)]
    pub locations: Vec<f64>,

    /// Reject items flagged as possibly sensitive
    #[serde(default = "default_true")]
    pub drop_sensitive: bool,

    /// Minimum gap between connection attempts
    #[serde(default = "default_min_reconnect_pause_ms")]
    pub min_reconnect_pause_ms: u64,

    /// Upper bound for the reconnect backoff
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// How long an HTTP stream endpoint may take to answer a connect
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl IngestConfig {
    pub fn min_reconnect_pause(&self) -> Duration {
        Duration::from_millis(self.min_reconnect_pause_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn replay_pace(&self) -> Duration {
        Duration::from_millis(self.replay_pace_ms)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            filter_url: default_filter_url(),
            sample_url: None,
            replay_file: None,
            replay_pace_ms: 0,
            replay_repeat: false,
            languages: default_languages(),
            locations: Vec::new(),
            drop_sensitive: true,
            min_reconnect_pause_ms: default_min_reconnect_pause_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

fn default_filter_url() -> String {
    "https://stream.twitter.com/1.1/statuses/filter.json".to_string()
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_min_reconnect_pause_ms() -> u64 {
    20_000
}

fn default_max_backoff_ms() -> u64 {
    320_000
}

fn default_response_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}
