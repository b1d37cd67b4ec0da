//! Application configuration

use crate::cli::Cli;
use activestream_annotation::AnnotationConfig;
use activestream_classifiers::{ClassifierConfig, ExtractorConfig, TrainerConfig};
use activestream_core::{Error, Result};
use activestream_ingest::IngestConfig;
use activestream_telemetry::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Keywords tracked from startup
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Capacity of the record and keyword-request queues
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Hard limit on waiting for workers during shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub trainer: TrainerConfig,

    #[serde(default)]
    pub annotation: AnnotationConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Streaming API credential, only ever taken from the environment
    #[serde(skip)]
    pub bearer_token: Option<String>,
}

impl AppConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = Self::from_file(&cli.config)?;

        if !cli.keywords.is_empty() {
            config.keywords = cli.keywords.clone();
        }
        if let Some(replay) = &cli.replay {
            config.ingest.replay_file = Some(replay.clone());
        }
        if let Some(listen) = &cli.listen {
            config.server.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(seed) = cli.seed {
            config.annotation.seed = Some(seed);
        }
        config.bearer_token = cli.bearer_token.clone();

        Ok(config)
    }

    /// Read a YAML file, or use defaults when it does not exist
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| {
            Error::config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::config("queue_capacity must be at least 1"));
        }
        if self.server.event_capacity == 0 {
            return Err(Error::config("server.event_capacity must be at least 1"));
        }
        if self.classifier.batch_size == 0 {
            return Err(Error::config("classifier.batch_size must be at least 1"));
        }
        if self.annotation.base_threshold == 0 {
            return Err(Error::config("annotation.base_threshold must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.annotation.evaluation_probability) {
            return Err(Error::config(format!(
                "annotation.evaluation_probability must be within [0, 1], got {}",
                self.annotation.evaluation_probability
            )));
        }
        if self.keywords.iter().all(|k| k.trim().is_empty()) && self.ingest.replay_file.is_none() {
            return Err(Error::config(
                "at least one keyword is required unless a replay file is configured",
            ));
        }
        if self.ingest.min_reconnect_pause_ms > self.ingest.max_backoff_ms {
            return Err(Error::config(
                "ingest.min_reconnect_pause_ms must not exceed ingest.max_backoff_ms",
            ));
        }
        if self.ingest.response_timeout_ms == 0 {
            return Err(Error::config("ingest.response_timeout_ms must be at least 1"));
        }
        if self.ingest.locations.len() % 4 != 0 {
            return Err(Error::config(
                "ingest.locations must hold whole bounding boxes (4 values each)",
            ));
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            queue_capacity: default_queue_capacity(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            server: ServerConfig::default(),
            ingest: IngestConfig::default(),
            extractor: ExtractorConfig::default(),
            classifier: ClassifierConfig::default(),
            trainer: TrainerConfig::default(),
            annotation: AnnotationConfig::default(),
            monitor: MonitorConfig::default(),
            bearer_token: None,
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Buffered outbound events per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    100
}

fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_event_capacity() -> usize {
    1024
}
