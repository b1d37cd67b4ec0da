//! ActiveStream Ingest
//!
//! Connects to the external streaming source and turns its line-delimited
//! messages into records for the feature extractor.
//!
//! - [`message`]: wire message classification and content-item parsing
//! - [`transport`]: HTTP and replay-file line streams
//! - [`source`]: tracked/sample amenders and inclusion filters
//! - [`pacer`]: reconnect rate limiting with backoff
//! - [`controller`]: the ingestion worker and its keyword request queue

pub mod config;
pub mod controller;
pub mod message;
pub mod pacer;
pub mod source;
pub mod transport;

pub use config::IngestConfig;
pub use controller::{IngestionController, KeywordAction, KeywordRequest};
pub use message::{RawItem, StreamMessage};
pub use pacer::ReconnectPacer;
pub use source::{Amender, InclusionFilter, SourceEvent, StreamSource};
pub use transport::{ConnectRequest, HttpTransport, LineStream, ReplayTransport, Transport};
