//! Scripted generator for tests.
//!
//! Replies are chosen by the first rule whose marker occurs in the prompt,
//! falling back to a default reply. Every prompt is recorded.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{GenerationError, LlmErrorKind, Result, TextGenerator};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(LlmErrorKind),
}

impl Reply {
    fn produce(&self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Fail(kind) => Err(GenerationError::api(*kind, "scripted failure")),
        }
    }
}

/// A [`TextGenerator`] with canned, marker-keyed replies.
#[derive(Debug)]
pub struct ScriptedGenerator {
    rules: Vec<(String, Reply)>,
    default_reply: Reply,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    /// Creates a generator answering every unmatched prompt with `default_reply`.
    #[must_use]
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default_reply: Reply::Text(default_reply.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Creates a generator failing every unmatched prompt with `kind`.
    #[must_use]
    pub fn failing(kind: LlmErrorKind) -> Self {
        Self {
            rules: Vec::new(),
            default_reply: Reply::Fail(kind),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers prompts containing `marker` with `reply`.
    #[must_use]
    pub fn respond_to(mut self, marker: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((marker.into(), Reply::Text(reply.into())));
        self
    }

    /// Fails prompts containing `marker` with `kind`.
    #[must_use]
    pub fn fail_on(mut self, marker: impl Into<String>, kind: LlmErrorKind) -> Self {
        self.rules.push((marker.into(), Reply::Fail(kind)));
        self
    }

    /// Returns every prompt received so far, in order.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    /// Returns the number of calls received so far.
    pub async fn call_count(&self) -> usize {
        self.prompts.lock().await.len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().await.push(prompt.to_string());
        self.rules
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
            .map_or(&self.default_reply, |(_, reply)| reply)
            .produce()
    }
}
