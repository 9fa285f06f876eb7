use thiserror::Error;

/// Application-wide error types for fitline.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request to the completion service could not be built or sent.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Completion service answered with a non-success, non-throttling status.
    #[error("LLM error (HTTP {status_code}): {message}")]
    LlmError {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// Completion service signalled HTTP 429.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Completion content was not the JSON (or text) shape we asked for.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid or missing configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The operation was abandoned before the batch was dispatched.
    #[error("Cancelled before dispatch")]
    Cancelled,

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if the completion service asked us to slow down.
    pub fn is_throttled(&self) -> bool {
        matches!(
            self,
            AppError::RateLimitExceeded
                | AppError::LlmError {
                    status_code: 429,
                    ..
                }
        )
    }

    /// Returns true if this error is transient and worth retrying.
    ///
    /// The dispatcher only consults this when transient retries are enabled;
    /// throttling is always retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::LlmError { retryable, .. } => *retryable,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttled_errors() {
        assert!(AppError::RateLimitExceeded.is_throttled());
        assert!(
            AppError::LlmError {
                message: "slow down".into(),
                status_code: 429,
                retryable: true,
            }
            .is_throttled()
        );
        assert!(
            !AppError::LlmError {
                message: "server error".into(),
                status_code: 500,
                retryable: true,
            }
            .is_throttled()
        );
        assert!(!AppError::NetworkError("reset".into()).is_throttled());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::RateLimitExceeded.is_retryable());
        assert!(
            AppError::LlmError {
                message: "server error".into(),
                status_code: 503,
                retryable: true,
            }
            .is_retryable()
        );
        assert!(!AppError::MalformedResponse("not json".into()).is_retryable());
        assert!(!AppError::ConfigError("no keys".into()).is_retryable());
    }
}
