//! Error types for depot.

use thiserror::Error;

/// Result type alias using depot's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for depot operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found (item, file, operation)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Item not found in the catalog
    #[error("Item not found: {0}")]
    ItemNotFound(i64),

    /// Invalid input (missing fields, disallowed values)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource exists but is not in a state that allows the request
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Path escapes the storage root
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Upstream metadata service unreachable
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Upstream metadata service answered with a non-success status
    #[error("Upstream rejected request ({status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    /// Archive could not be read (not a valid zip/tar stream)
    #[error("Archive error: {0}")]
    Archive(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Upstream(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("operation abc".to_string());
        assert_eq!(err.to_string(), "Not found: operation abc");
    }

    #[test]
    fn test_error_display_item_not_found() {
        let err = Error::ItemNotFound(42);
        assert_eq!(err.to_string(), "Item not found: 42");
    }

    #[test]
    fn test_error_display_forbidden() {
        let err = Error::Forbidden("../etc/passwd".to_string());
        assert_eq!(err.to_string(), "Forbidden: ../etc/passwd");
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("operation still running".to_string());
        assert_eq!(err.to_string(), "Conflict: operation still running");
    }

    #[test]
    fn test_error_display_archive() {
        let err = Error::Archive("unexpected EOF".to_string());
        assert_eq!(err.to_string(), "Archive error: unexpected EOF");
    }

    #[test]
    fn test_error_display_upstream() {
        let err = Error::Upstream("connection refused".to_string());
        assert_eq!(err.to_string(), "Upstream error: connection refused");
    }

    #[test]
    fn test_error_display_upstream_rejected() {
        let err = Error::UpstreamRejected {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Upstream rejected request (500): boom");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
