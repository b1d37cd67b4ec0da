//! ActiveStream Core
//!
//! Core types, traits, and utilities shared across ActiveStream components.
//!
//! This crate provides:
//! - The record data model and model-version stamps
//! - Error types and result handling
//! - The append-only vocabulary index
//! - The document store contract and an in-memory store
//! - Coordination primitives (events, single-slot mailboxes, stop tokens)
//! - Annotation channel events and the outbound event bus

pub mod channel;
pub mod error;
pub mod keywords;
pub mod store;
pub mod sync;
pub mod types;
pub mod vocabulary;

pub use channel::{EventBus, InboundEvent, OutboundEvent, StatusReport, Verdict};
pub use error::{Error, Result};
pub use keywords::{Keyword, KeywordSet, SharedKeywords};
pub use store::{
    BulkResult, DocumentStore, Filter, LabelFilter, MemoryStore, Query, RecordUpdate,
    SharedStore, SortField, UpdateGuard,
};
pub use sync::{retry_transient, sleep_or_stop, Event, Mailbox, StopToken};
pub use types::{
    annotation_priority, Author, BagOfTerms, Classification, EntityKind, EntitySpan,
    ManualLabel, ModelStamp, Origin, Record, RecordId, TermId, DECISION_BOUNDARY,
};
pub use vocabulary::{SharedVocabulary, Vocabulary};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::store::{DocumentStore, Filter, Query, RecordUpdate, SharedStore};
    pub use crate::sync::{Event, Mailbox, StopToken};
    pub use crate::types::{ManualLabel, ModelStamp, Origin, Record};
    pub use crate::vocabulary::{SharedVocabulary, Vocabulary};
}
