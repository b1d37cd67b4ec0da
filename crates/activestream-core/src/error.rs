//! Error types for ActiveStream

/// Result type alias using ActiveStream's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ActiveStream operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Document store errors (transient, retried by the caller)
    #[error("store error: {0}")]
    Store(String),

    /// Streaming source errors (transient, trigger a reconnect)
    #[error("stream error: {0}")]
    Stream(String),

    /// Model fitting or prediction errors
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Invalid operator input on the annotation channel
    #[error("annotation error: {0}")]
    Annotation(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// A pipeline invariant was violated; fatal to the worker that observed it
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout errors
    #[error("operation timed out")]
    Timeout,

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Create a new classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new annotation error
    pub fn annotation(msg: impl Into<String>) -> Self {
        Self::Annotation(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new invariant violation
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the owning worker should retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Stream(_) | Self::Io(_) | Self::Timeout
        )
    }
}
