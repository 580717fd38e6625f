//! Typed errors for the enrichment library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so the batch layer can
//! pattern-match on what went wrong and decide a per-message outcome.
//!
//! # The Error Boundary Rule
//!
//! > **No error ever crosses the batch processor boundary.**
//!
//! - `DecodeError` and `StageError` are produced inside the pipeline
//! - `RecordFailure` is the only thing the batch layer reports per message

use thiserror::Error;

use crate::types::outcome::Stage;

/// Boxed cause carried by stage and storage errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while decoding a queue message body.
///
/// Both variants are terminal: a malformed body never decodes on redelivery.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The outer notification envelope is missing or malformed
    #[error("notification envelope invalid: {0}")]
    EnvelopeInvalid(#[source] serde_json::Error),

    /// The nested document event is malformed or missing required fields
    #[error("document event payload invalid: {0}")]
    PayloadInvalid(#[source] serde_json::Error),
}

/// Errors returned by a pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// The collaborator call failed (network, decoding, storage, ...)
    #[error("{stage} stage failed: {source}")]
    Failed {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    /// An HTTP collaborator answered with a non-success status
    #[error("{stage} stage rejected with HTTP {status}: {body}")]
    Rejected {
        stage: Stage,
        status: u16,
        body: String,
    },

    /// The invocation was cancelled while the stage was running
    #[error("{stage} stage cancelled")]
    Cancelled { stage: Stage },
}

impl StageError {
    /// Wrap any error as a failure of `stage`.
    pub fn failed(stage: Stage, source: impl Into<BoxError>) -> Self {
        Self::Failed {
            stage,
            source: source.into(),
        }
    }

    /// The stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Failed { stage, .. } | Self::Rejected { stage, .. } | Self::Cancelled { stage } => {
                *stage
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Why a message failed. Every failure makes the message visible again.
#[derive(Debug, Error)]
pub enum RecordFailure {
    /// Body could not be decoded; will never succeed on redelivery
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Thumbnail generation failed; nothing downstream can run
    #[error("thumbnail generation failed: {0}")]
    Thumbnail(#[source] StageError),

    /// The invocation was cancelled before the record completed
    #[error("processing cancelled")]
    Cancelled,

    /// A stage panicked
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl RecordFailure {
    /// Whether redelivering the message could ever succeed.
    ///
    /// Non-retryable failures are still reported as failures so the queue's
    /// redrive policy applies uniformly.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

/// Errors from object storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Bucket or key would escape the store root
    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("link signing failed: {0}")]
    Signing(String),
}

/// Result type alias for stage calls.
pub type StageResult<T> = std::result::Result<T, StageError>;

/// Result type alias for object storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
