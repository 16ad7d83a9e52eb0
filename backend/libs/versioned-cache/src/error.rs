//! Cache error types

use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The store connection could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// A store call failed after the connection was up
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A value handed to the cache could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid version key parameters: {0}")]
    InvalidParams(String),

    /// Read-through loader returned an error
    #[error("Loader failed: {0}")]
    Loader(String),
}

impl CacheError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::Connection(_) => "connection",
            CacheError::Store(StoreError::Timeout(_)) => "timeout",
            CacheError::Store(_) => "store",
            CacheError::Serialization(_) => "serialize",
            CacheError::Configuration(_) => "configuration",
            CacheError::InvalidParams(_) => "invalid_params",
            CacheError::Loader(_) => "loader",
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = CacheError::Configuration("namespace is required".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: namespace is required"
        );

        let err = CacheError::from(StoreError::Timeout(Duration::from_millis(50)));
        assert_eq!(
            err.to_string(),
            "Store error: Store operation timed out after 50ms"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(
            CacheError::from(StoreError::Timeout(Duration::from_secs(1))).kind(),
            "timeout"
        );
        assert_eq!(
            CacheError::from(StoreError::UnexpectedReply("x".into())).kind(),
            "store"
        );
        assert_eq!(CacheError::Connection("refused".into()).kind(), "connection");
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<String>("invalid json").unwrap_err();
        let err: CacheError = json_err.into();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
