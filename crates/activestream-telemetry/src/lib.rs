//! ActiveStream Telemetry
//!
//! Counters, live classifier quality and periodic status reports.
//!
//! Provides:
//! - Pipeline counters mirrored to the `metrics` facade
//! - Confusion counters with precision, recall and F1
//! - The monitor worker that publishes status reports

pub mod confusion;
pub mod stats;
pub mod monitor;

pub use confusion::{ConfusionCounters, ConfusionSnapshot};
pub use stats::{PipelineStats, StatsSnapshot};
pub use monitor::{Monitor, MonitorConfig, StatusBoard};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::confusion::ConfusionCounters;
    pub use crate::stats::PipelineStats;
    pub use crate::monitor::{Monitor, MonitorConfig};
}
