//! Storage client error types.
//!
//! Errors fall into two channels that are never merged.  Local stream
//! errors come from the in-process upload pipe and are returned by
//! [`ObjectWriter::write`](crate::writer::ObjectWriter::write) and
//! [`ObjectWriter::close`](crate::writer::ObjectWriter::close).  Remote
//! call errors come from the single network request and are only visible
//! through [`ObjectWriter::result`](crate::writer::ObjectWriter::result)
//! and the lookup methods on [`Client`](crate::client::Client).

use std::sync::Arc;

use thiserror::Error;

/// Error codes expressed as a Rust enum.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A write was attempted after the writer was closed.
    #[error("write on closed object writer")]
    ClosedPipe,

    /// The upload stopped reading before all content was handed over.
    #[error("upload reader went away before all content was consumed")]
    BrokenPipe,

    /// A request argument is invalid.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// The execution context was cancelled while the call was in flight.
    #[error("operation cancelled")]
    Cancelled,

    /// The execution context's deadline passed while the call was in flight.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// The background upload task ended without reporting an outcome.
    #[error("upload task ended without reporting a result")]
    TaskAborted,

    /// The requested object does not exist.
    #[error("object `{name}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, name: String },

    /// The requested bucket does not exist.
    #[error("bucket `{bucket}` not found")]
    BucketNotFound { bucket: String },

    /// The service rejected the request.
    #[error("{message} (code {code})")]
    Api { code: u16, message: String },

    /// Catch-all for transport failures (network, decoding, ...).
    #[error("transport error: {0:#}")]
    Transport(Arc<anyhow::Error>),
}

impl StorageError {
    /// Return a stable, machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::ClosedPipe => "ClosedPipe",
            StorageError::BrokenPipe => "BrokenPipe",
            StorageError::InvalidArgument { .. } => "InvalidArgument",
            StorageError::Cancelled => "Cancelled",
            StorageError::DeadlineExceeded => "DeadlineExceeded",
            StorageError::TaskAborted => "TaskAborted",
            StorageError::ObjectNotFound { .. } => "ObjectNotFound",
            StorageError::BucketNotFound { .. } => "BucketNotFound",
            StorageError::Api { .. } => "Api",
            StorageError::Transport(_) => "Transport",
        }
    }

    /// Whether this error originates from the local upload pipe rather
    /// than from the remote call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            StorageError::ClosedPipe
                | StorageError::BrokenPipe
                | StorageError::InvalidArgument { .. }
        )
    }

    /// Shortcut for [`StorageError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        StorageError::InvalidArgument {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for StorageError {
    fn from(err: anyhow::Error) -> Self {
        StorageError::Transport(Arc::new(err))
    }
}
