//! Common error types for fleet components.

use std::fmt;

/// A specialized Result type for fleet operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for fleet operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Check error: {0}")]
    Check(String),
}

impl Error {
    /// Create a new registry error.
    pub fn registry(msg: impl fmt::Display) -> Self {
        Error::Registry(msg.to_string())
    }

    /// Create a new check error.
    pub fn check(msg: impl fmt::Display) -> Self {
        Error::Check(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::registry("duplicate entry").to_string(),
            "Registry error: duplicate entry"
        );
        assert_eq!(
            Error::check("bad url").to_string(),
            "Check error: bad url"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
