//! Error types for Weir

use hyper::StatusCode;

/// Main error type for pipeline operations
#[derive(Debug, thiserror::Error)]
pub enum WeirError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Too many requests in flight")]
    Backpressure,

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Upstream publish failed: {0}")]
    Upstream(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WeirError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Backpressure => StatusCode::SERVICE_UNAVAILABLE,
            Self::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Retry-After advice in seconds, for rejections the client should retry
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Backpressure | Self::CircuitOpen => Some(1),
            Self::Queue(_) | Self::Database(_) => Some(5),
            _ => None,
        }
    }
}

// Implement From conversions for common error types

impl From<tokio_postgres::Error> for WeirError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for WeirError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Database(format!("Pool error: {}", err))
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, WeirError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_rejections_are_503_with_retry_advice() {
        assert_eq!(WeirError::Backpressure.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(WeirError::CircuitOpen.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(WeirError::Backpressure.retry_after_secs(), Some(1));
        assert_eq!(WeirError::CircuitOpen.retry_after_secs(), Some(1));
    }

    #[test]
    fn test_upstream_is_502_without_retry_advice() {
        let err = WeirError::Upstream("publish rejected".into());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.retry_after_secs(), None);
    }

    #[test]
    fn test_invalid_request_is_400() {
        let err = WeirError::InvalidRequest("missing key".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
