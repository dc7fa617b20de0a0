//! Error types for Loopy
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Loopy
#[derive(Debug, Error)]
pub enum LoopyError {
    /// Loop not found in storage
    #[error("Loop {0} not found")]
    LoopNotFound(String),

    /// A loop with this id already exists
    #[error("Loop {0} already exists")]
    LoopExists(String),

    /// Another live process is running this loop
    #[error("Loop {id} is already being run by process {pid}")]
    LoopBusy { id: String, pid: u32 },

    /// Persisted item status outside the known set
    #[error("Corrupt item status in store: {0:?}")]
    CorruptStatus(String),

    /// Persisted timestamp that cannot be parsed
    #[error("Corrupt timestamp in store: {0:?}")]
    CorruptTimestamp(String),

    /// Item row vanished while it was being updated
    #[error("Item {0} not found")]
    ItemNotFound(i64),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// SQLite error
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Loopy operations
pub type Result<T> = std::result::Result<T, LoopyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_not_found_error() {
        let err = LoopyError::LoopNotFound("batch".to_string());
        assert_eq!(err.to_string(), "Loop batch not found");
    }

    #[test]
    fn test_loop_exists_error() {
        let err = LoopyError::LoopExists("batch".to_string());
        assert_eq!(err.to_string(), "Loop batch already exists");
    }

    #[test]
    fn test_loop_busy_error() {
        let err = LoopyError::LoopBusy {
            id: "batch".to_string(),
            pid: 4242,
        };
        assert_eq!(err.to_string(), "Loop batch is already being run by process 4242");
    }

    #[test]
    fn test_corrupt_status_error() {
        let err = LoopyError::CorruptStatus("RUNNING".to_string());
        assert!(err.to_string().contains("\"RUNNING\""));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LoopyError = io_err.into();
        assert!(matches!(err, LoopyError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: LoopyError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, LoopyError::Storage(_)));
        assert!(err.to_string().starts_with("Storage error:"));
    }
}
