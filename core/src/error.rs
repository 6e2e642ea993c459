//! Error types for the indexing pipeline.

use thiserror::Error;

use crate::DocId;

/// Top-level error type for lyrix-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No stemmer is registered for the requested language code.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// A corpus record is missing a required field or has one of the wrong shape.
    #[error("invalid document{}: {reason}", .id.map(|id| format!(" {id}")).unwrap_or_default())]
    InvalidDocument { id: Option<DocId>, reason: String },

    /// The pipeline was configured in a way it cannot run with.
    #[error("configuration error: {0}")]
    Config(String),

    /// A worker thread panicked while normalizing its slice of documents.
    #[error("worker failed: {0}")]
    WorkerFailed(String),

    /// A stage expected an artifact that no earlier stage produced.
    #[error("missing artifact: {0}")]
    MissingArtifact(String),

    /// The storage collaborator refused a document above its size ceiling.
    #[error("record {key} is {size} bytes, above the {limit} byte ceiling")]
    RecordTooLarge { key: String, size: usize, limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("store error: {0}")]
    Store(#[from] sled::Error),
}

impl Error {
    pub(crate) fn invalid(id: Option<DocId>, reason: impl Into<String>) -> Self {
        Error::InvalidDocument { id, reason: reason.into() }
    }
}

/// Result type for lyrix-core operations.
pub type Result<T> = std::result::Result<T, Error>;
