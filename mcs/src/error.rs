//! Error types for the codespace manager

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the codespace manager
#[derive(Debug, Error)]
pub enum Error {
    // Codespace errors (2000-2999)
    #[error("Codespace not found: {0}")]
    CodespaceNotFound(String),

    #[error("Codespace in invalid state: cannot go from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Failed to fetch repository {url}: {reason}")]
    SourceFetchFailed { url: String, reason: String },

    #[error("No free port available starting at {0}")]
    NoFreePort(u16),

    // Backup errors (3000-3999)
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Backup source does not exist: {0}")]
    BackupSourceMissing(String),

    #[error("Restore target already contains: {}", .0.join(", "))]
    RestoreConflict(Vec<String>),

    #[error("Invalid backup metadata: {0}")]
    InvalidBackupMetadata(String),

    // Container engine errors (6000-6999)
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Docker error: {0}")]
    DockerError(String),

    #[error("Docker Compose is not available: {0}")]
    ComposeUnavailable(String),

    #[error("Compose command failed: {0}")]
    ComposeFailed(String),

    #[error("{operation} finished with errors: succeeded {succeeded}, failed {failed}")]
    BulkOperationFailed {
        operation: String,
        succeeded: usize,
        failed: usize,
    },

    // General errors (1000-1999)
    #[error("Invalid repository reference: {0}")]
    InvalidRepository(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the error code
    pub fn code(&self) -> u32 {
        match self {
            // Codespace errors (2000-2999)
            Error::CodespaceNotFound(_) => 2001,
            Error::InvalidTransition { .. } => 2003,
            Error::SourceFetchFailed { .. } => 2004,
            Error::NoFreePort(_) => 2005,

            // Backup errors (3000-3999)
            Error::BackupNotFound(_) => 3001,
            Error::BackupSourceMissing(_) => 3002,
            Error::RestoreConflict(_) => 3003,
            Error::InvalidBackupMetadata(_) => 3004,

            // Container engine errors (6000-6999)
            Error::ContainerNotFound(_) => 6001,
            Error::DockerError(_) => 6002,
            Error::ComposeUnavailable(_) => 6003,
            Error::ComposeFailed(_) => 6004,
            Error::BulkOperationFailed { .. } => 6005,

            // General errors (1000-1999)
            Error::InvalidRepository(_) => 1001,
            Error::InvalidAddress(_) => 1002,
            Error::InvalidParameter(_) => 1003,
            Error::Cancelled => 1004,
            Error::Serialization(_) => 1005,
            Error::Internal(_) => 1006,
        }
    }
}

// Implement From for common error types
impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Error::DockerError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_error_message_reports_counts() {
        let err = Error::BulkOperationFailed {
            operation: "Container cleanup".to_string(),
            succeeded: 3,
            failed: 2,
        };
        assert_eq!(
            err.to_string(),
            "Container cleanup finished with errors: succeeded 3, failed 2"
        );
        assert_eq!(err.code(), 6005);
    }

    #[test]
    fn test_restore_conflict_lists_entries() {
        let err = Error::RestoreConflict(vec!["src".to_string(), "data".to_string()]);
        assert_eq!(err.to_string(), "Restore target already contains: src, data");
    }

    #[test]
    fn test_codes_are_grouped_by_area() {
        assert_eq!(Error::InvalidRepository("x".into()).code(), 1001);
        assert_eq!(Error::CodespaceNotFound("x".into()).code(), 2001);
        assert_eq!(Error::BackupNotFound("x".into()).code(), 3001);
        assert_eq!(Error::ContainerNotFound("x".into()).code(), 6001);
    }
}
