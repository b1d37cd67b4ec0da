//! ActiveStream server
//!
//! Wires the ingestion, extraction, classification, training, annotation
//! and monitoring workers into one pipeline and exposes the annotation
//! channel over HTTP and WebSocket.

pub mod cli;
pub mod config;
pub mod pipeline;
pub mod routes;
pub mod websocket;

pub use cli::Cli;
pub use config::{AppConfig, ServerConfig};
pub use pipeline::{Pipeline, PipelineHandle};
pub use routes::{create_router, AppState};
