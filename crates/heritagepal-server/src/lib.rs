//! HeritagePAL Server
//!
//! Learning-set generation and persistence, quiz scoring, and the HTTP API.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod learning;
pub mod persistence;
pub mod prompt;
pub mod scoring;

pub use api::{create_router, ApiError, AppState, ErrorResponse};
pub use config::{Config, Environment, GeminiSettings, SupabaseSettings, PLACEHOLDER_GEMINI_KEY};
pub use error::{Artifact, HeritageError, Result};
pub use learning::{
    fallback_flashcards, fallback_quiz, parse_flashcards, parse_quiz_questions, Flashcard,
    LearningSet, LearningSetGenerator, Parsed, QuizQuestion, SUMMARY_UNAVAILABLE,
};
pub use persistence::{PersistenceCoordinator, SavedLearningSession};
pub use prompt::{Difficulty, DEFAULT_FLASHCARDS, DEFAULT_QUIZ_QUESTIONS};
pub use scoring::{score_answers, QuestionResult, QuizScore};
