//! Error types for the sync subsystem.
//!
//! Every fallible operation in the crate returns [`SyncResult`].

use thiserror::Error;

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Main error type for sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// A sync cycle is already running on this manager.
    #[error("Sync already in progress")]
    InProgress,

    /// The background scheduler was started twice.
    #[error("Auto sync is already running")]
    AutoSyncRunning,

    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("Sync service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Conflict not found: {0}")]
    ConflictNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Create a new service error from a status code and response body
    pub fn service(status: u16, body: impl Into<String>) -> Self {
        SyncError::Service {
            status,
            body: body.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Config(message.into())
    }

    /// Whether the next scheduled cycle may succeed without intervention.
    pub fn is_retriable(&self) -> bool {
        match self {
            SyncError::InProgress | SyncError::Network(_) => true,
            SyncError::Service { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_display_includes_body() {
        let err = SyncError::service(500, "database locked");
        assert_eq!(err.to_string(), "Sync service returned 500: database locked");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(SyncError::InProgress.is_retriable());
        assert!(SyncError::Network("timeout".into()).is_retriable());
        assert!(SyncError::service(503, "").is_retriable());
        assert!(!SyncError::service(401, "bad token").is_retriable());
        assert!(!SyncError::ConflictNotFound("n1".into()).is_retriable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SyncError = io.into();
        assert!(matches!(err, SyncError::Io(_)));
    }
}
