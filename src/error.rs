//! Error types for the Slidegate service.

use thiserror::Error;

/// Main error type for Slidegate operations.
#[derive(Error, Debug)]
pub enum SlidegateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A quota with a zero window or zero request budget
    #[error("Invalid quota: {0}")]
    InvalidQuota(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Slidegate operations.
pub type Result<T> = std::result::Result<T, SlidegateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SlidegateError::Server("connection reset".to_string());
        assert_eq!(err.to_string(), "Server error: connection reset");

        let err: SlidegateError =
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use").into();
        assert!(matches!(err, SlidegateError::Io(_)));
        assert_eq!(err.to_string(), "I/O error: address in use");
    }
}
