//! Error types for the HeritagePAL server.
//!
//! Covers configuration loading, request validation, generation and
//! persistence of learning sets, and quiz scoring. The HTTP layer maps these
//! onto status codes in [`crate::api::ApiError`].

use std::fmt;
use std::path::PathBuf;

use heritagepal_genai::GenerationError;
use heritagepal_store::StoreError;

/// A specialized `Result` type for server operations.
pub type Result<T> = std::result::Result<T, HeritageError>;

/// The rows written when a learning set is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// The generated summary.
    EducationalContent,
    /// The generated quiz.
    Quiz,
    /// The generated flashcard deck.
    FlashcardSet,
    /// The session row linking the other three.
    LearningSession,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EducationalContent => write!(f, "educational content"),
            Self::Quiz => write!(f, "quiz"),
            Self::FlashcardSet => write!(f, "flashcard set"),
            Self::LearningSession => write!(f, "learning session"),
        }
    }
}

/// Errors that can occur while serving requests.
#[derive(Debug, thiserror::Error)]
pub enum HeritageError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your heritagepal.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// A required field is missing or out of range. The message names the field.
    #[error("{0}")]
    InvalidInput(String),

    /// A referenced row does not exist.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up, e.g. "Topic".
        what: String,
    },

    // ========================================================================
    // Learning Set Errors
    // ========================================================================
    /// The generation service call itself failed.
    #[error("Failed to generate learning content: {0}")]
    GenerationFailed(#[source] GenerationError),

    /// One of the learning-set inserts failed; earlier rows were removed.
    #[error("Failed to save {artifact}")]
    PersistFailed {
        /// The artifact whose insert failed.
        artifact: Artifact,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    // ========================================================================
    // Scoring Errors
    // ========================================================================
    /// A stored quiz's questions are not a readable JSON array.
    #[error("Error parsing quiz questions")]
    CorruptQuiz {
        /// The quiz whose questions could not be read.
        quiz_id: String,
        /// Description of the parse error.
        message: String,
    },

    // ========================================================================
    // Store Errors
    // ========================================================================
    /// Any other store failure.
    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HeritageError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a new `PersistFailed` error.
    #[must_use]
    pub const fn persist_failed(artifact: Artifact, source: StoreError) -> Self {
        Self::PersistFailed { artifact, source }
    }

    /// Returns `true` if the error was caused by the caller's input.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::NotFound { .. })
    }
}
