//! Error types for the embedding client

/// Result type for embedding operations.
///
/// Convenience alias using [`EmbedError`] as the error type, used throughout
/// the crate.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding-client operations.
///
/// Configuration problems are fatal and never retried; transport and service
/// failures are retried by the provider before one of these surfaces to the
/// caller.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Missing or invalid client configuration (endpoint, credentials,
    /// dimension). Fatal: surfaced immediately, never retried.
    #[error("Invalid embedding configuration: {message}")]
    Configuration { message: String },

    /// Transport-level failure talking to the embedding service.
    #[error("Embedding request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// The embedding service answered with a non-success status. Carries the
    /// last status observed after the retry budget was spent.
    #[error("Embedding service error (status {status}): {message}")]
    Service { status: u16, message: String },

    /// The service returned vectors of an unexpected dimension. The vector
    /// dimension is a fixed configuration constant, so this indicates a
    /// model/config mismatch rather than a transient fault.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The service returned a payload we could not interpret (missing rows,
    /// row-count mismatch).
    #[error("Malformed embedding response: {message}")]
    MalformedResponse { message: String },
}

impl EmbedError {
    /// Create a configuration error with a custom message.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a service error from a status code and body.
    pub fn service<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Service {
            status,
            message: message.into(),
        }
    }

    /// Create a malformed-response error.
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Whether a retry can plausibly succeed. Configuration and dimension
    /// errors never heal on retry; transport errors and 429/5xx statuses
    /// might.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Service { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_not_retryable() {
        assert!(!EmbedError::configuration("no endpoint").is_retryable());
        assert!(
            !EmbedError::DimensionMismatch {
                expected: 768,
                actual: 384
            }
            .is_retryable()
        );
    }

    #[test]
    fn service_errors_retry_on_throttle_and_5xx_only() {
        assert!(EmbedError::service(429, "slow down").is_retryable());
        assert!(EmbedError::service(503, "unavailable").is_retryable());
        assert!(!EmbedError::service(400, "bad input").is_retryable());
        assert!(!EmbedError::service(401, "bad key").is_retryable());
    }
}
