//! Metadata store error types.

use memo_storage::StorageError;
use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The replacement could not be encoded. Never retried.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Two non-deterministic writers produced different content for one fingerprint.
    #[error("determinism conflict for {fingerprint}")]
    DeterminismConflict { fingerprint: String },

    #[error("gave up on {fingerprint} after {attempts} conflicting attempts")]
    RetriesExhausted { fingerprint: String, attempts: u32 },

    #[error("remote service returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("operation {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: std::time::Duration,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] memo_core::Error),

    #[error("content error: {0}")]
    Content(String),
}

impl MetadataError {
    /// Whether the same call may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            MetadataError::Storage(e) => e.is_transient(),
            MetadataError::Http(e) => !e.is_builder() && !e.is_decode(),
            MetadataError::Timeout { .. } => true,
            MetadataError::Remote { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let io = StorageError::Io(std::io::Error::other("x"));
        assert!(MetadataError::Storage(io).is_transient());
        assert!(!MetadataError::Storage(StorageError::NotFound("k".to_string())).is_transient());
        assert!(
            MetadataError::Remote {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !MetadataError::Remote {
                status: 400,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!MetadataError::Serialization("bad".to_string()).is_transient());
        assert!(
            !MetadataError::DeterminismConflict {
                fingerprint: "f".to_string()
            }
            .is_transient()
        );
    }
}
