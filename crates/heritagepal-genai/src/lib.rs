//! HeritagePAL Generation Service
//!
//! Clients for the large-language-model text endpoint used to write
//! summaries, quizzes, flashcards and tutor replies.
//!
//! All clients implement [`TextGenerator`], which takes a fully rendered
//! prompt and returns the raw response text. Interpreting that text is left
//! to the caller.

use async_trait::async_trait;

pub mod gemini;
pub mod offline;
pub mod scripted;

pub use gemini::{GeminiClient, DEFAULT_MODEL};
pub use offline::{OfflineGenerator, OFFLINE_RESPONSE};
pub use scripted::ScriptedGenerator;

/// A specialized `Result` type for generation calls.
pub type Result<T> = std::result::Result<T, GenerationError>;

/// A text-in, text-out generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends `prompt` to the backend and returns the generated text.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Errors raised by a generation call itself (not by parsing its output).
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The generation service rejected or failed the request.
    #[error("Generation service error ({kind}): {message}\n\nSuggestion: {suggestion}")]
    Api {
        /// Classification of the failure.
        kind: LlmErrorKind,
        /// Detailed message from the service or transport.
        message: String,
        /// Actionable suggestion for the operator.
        suggestion: String,
    },

    /// The service answered successfully but produced no text.
    #[error("Generation service returned no text\n\nSuggestion: The prompt may have been blocked; check the service's safety settings")]
    EmptyResponse,
}

impl GenerationError {
    /// Creates a new `Api` error with the kind's default suggestion.
    #[must_use]
    pub fn api(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self::Api {
            kind,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Returns the failure classification.
    #[must_use]
    pub const fn kind(&self) -> LlmErrorKind {
        match self {
            Self::Api { kind, .. } => *kind,
            Self::EmptyResponse => LlmErrorKind::Other,
        }
    }

    /// Returns `true` if retrying the same request later might succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            LlmErrorKind::RateLimit | LlmErrorKind::Server | LlmErrorKind::Network
        )
    }
}

/// Categories of generation-service errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Invalid or missing API key.
    Authentication,
    /// Quota or rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl LlmErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check GOOGLE_GEMINI_API_KEY",
            Self::RateLimit => "Wait and retry, or reduce request frequency",
            Self::Server => "Retry later; the generation service may be experiencing issues",
            Self::Network => "Check your network connection",
            Self::Other => "Check the generation service's status page",
        }
    }
}
