//! Error types for the answer pipeline

/// Result type for answer-pipeline operations.
pub type Result<T> = std::result::Result<T, AnswerError>;

/// Error taxonomy for the answer pipeline.
///
/// Only two classes ever reach the caller: configuration problems (fatal,
/// reported before any work starts) and generation failures that survived
/// the retry. Retrieval-side timeouts are recovered internally via the
/// fallback path and never surface here, and "no results" is not an error
/// at all: it is an explicit insufficient-data answer.
#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    /// Missing or invalid engine configuration (store path, endpoints,
    /// credentials). Fatal, surfaced immediately, no retry.
    #[error("Invalid engine configuration: {message}")]
    Configuration { message: String },

    /// The generation service failed even after the retry. Never reported
    /// as a silently empty answer.
    #[error("Answer generation failed after {attempts} attempts: {message}")]
    Generation { attempts: u32, message: String },

    /// Transport-level failure talking to the generation service.
    #[error("Generation request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// Embedding client failure that was not recoverable by falling back to
    /// structured-only retrieval (i.e. a configuration problem).
    #[error("Embedding service error: {source}")]
    Embedding {
        #[from]
        source: tender_ai_embed::EmbedError,
    },

    /// Storage-layer failure.
    #[error("Store error: {source}")]
    Store {
        #[from]
        source: anyhow::Error,
    },
}

impl AnswerError {
    /// Create a configuration error with a custom message.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a generation error recording how many attempts were made.
    pub fn generation<S: Into<String>>(attempts: u32, message: S) -> Self {
        Self::Generation {
            attempts,
            message: message.into(),
        }
    }
}
