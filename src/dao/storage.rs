use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A stored document could not be mapped back into its entity.
    #[error("corrupt document `{id}`: {reason}")]
    Corrupt { id: String, reason: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct an error for a document that no longer matches the expected schema.
    pub fn corrupt(id: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::Corrupt {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
