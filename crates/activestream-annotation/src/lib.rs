//! ActiveStream Annotation
//!
//! The human-in-the-loop side of the pipeline: uncertainty sampling of
//! records for review, interleaved evaluation rounds that measure the live
//! model, and the adaptive schedule that decides when to retrain.

pub mod annotator;
pub mod config;
pub mod memo;
pub mod schedule;

pub use annotator::{Annotator, RoundOutcome};
pub use config::AnnotationConfig;
pub use memo::VerdictMemo;
pub use schedule::RetrainSchedule;
