//! Generator used when no API key is configured.

use async_trait::async_trait;
use tracing::debug;

use crate::{Result, TextGenerator};

/// Text returned for every prompt by [`OfflineGenerator`].
pub const OFFLINE_RESPONSE: &str = "This is a mock response because no valid Gemini API key was provided. \
To use the real AI functionality, please obtain an API key from https://ai.google.dev/ \
and add it to your .env file as GOOGLE_GEMINI_API_KEY.";

/// Answers every prompt with [`OFFLINE_RESPONSE`].
///
/// Structured prompts (quizzes, flashcards) therefore always take their
/// fallback path, which keeps the service usable without credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(prompt_len = prompt.len(), "Using offline generator");
        Ok(OFFLINE_RESPONSE.to_string())
    }
}
