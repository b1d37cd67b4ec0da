//! Annotation channel events and the broadcast bus that carries them
//!
//! Outbound events flow from the annotation loop and the monitor to any
//! connected transport; inbound events are parsed by the transport and
//! routed to the annotation loop (verdicts) or the ingestion controller
//! (keyword changes).

use crate::error::{Error, Result};
use crate::types::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::sync::broadcast;

/// Periodic pipeline status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub timestamp: DateTime<Utc>,
    /// Records stored since the previous report
    pub throughput: u64,
    /// Documents the source reported as dropped by rate limiting
    pub missed_count: u64,
    /// Share of records scored by a model, in percent
    pub coverage_pct: f64,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
    pub top_features: Vec<String>,
    pub model_version: u64,
    pub total_count: usize,
    pub annotated_count: usize,
    pub annotated_relevant: usize,
    pub annotated_irrelevant: usize,
    pub keywords: Vec<String>,
}

/// Events sent to the human-facing transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Present a record for review
    DisplayItem {
        id: RecordId,
        guess: f64,
        is_evaluation: bool,
    },
    /// Nothing is eligible for review right now
    Waiting,
    /// Human-readable notice
    Notice { message: String },
    StatusReport(StatusReport),
}

/// Events received from the human-facing transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Raw verdict text; validated by the annotation loop
    Verdict(String),
    AddKeyword { word: String },
    RemoveKeyword { word: String },
}

/// Oracle answer for the record on display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Relevant,
    Irrelevant,
    Skip,
    /// Restart the round without committing
    Refresh,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relevant => "relevant",
            Self::Irrelevant => "irrelevant",
            Self::Skip => "skip",
            Self::Refresh => "refresh",
        }
    }
}

impl FromStr for Verdict {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "relevant" | "tweet_relevant" | "yes" => Ok(Self::Relevant),
            "irrelevant" | "tweet_irrelevant" | "no" => Ok(Self::Irrelevant),
            "skip" => Ok(Self::Skip),
            "refresh" => Ok(Self::Refresh),
            other => Err(Error::annotation(format!("unrecognized verdict '{}'", other))),
        }
    }
}

/// Broadcast bus for outbound events
pub struct EventBus {
    sender: broadcast::Sender<OutboundEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: OutboundEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
