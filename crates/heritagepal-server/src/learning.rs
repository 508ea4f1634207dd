//! Learning-set generation.
//!
//! A learning set is the summary, quiz, and flashcard deck generated for one
//! topic and grade. The three generation calls run concurrently; each
//! structured response is parsed independently and degrades to a fixed
//! fallback when it cannot be read.

use std::sync::Arc;

use heritagepal_genai::TextGenerator;
use heritagepal_store::Topic;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{HeritageError, Result};
use crate::prompt::{self, Difficulty, DEFAULT_FLASHCARDS, DEFAULT_QUIZ_QUESTIONS, MAX_SOURCE_CHARS};

/// Summary text used when the service returns nothing.
pub const SUMMARY_UNAVAILABLE: &str =
    "Summary generation is currently unavailable. Please try again later.";

/// Source label stored on generated content.
pub const AI_GENERATED_SOURCE: &str = "AI-Generated";

static CODE_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").ok());

// ============================================================================
// Parsed items
// ============================================================================

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    /// The question.
    #[serde(alias = "question")]
    pub question_text: String,
    /// Answer options, normally four.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_answer: usize,
    /// Why the answer is correct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Topic label.
    #[serde(default)]
    pub topic: String,
    /// Difficulty label.
    #[serde(default)]
    pub difficulty: String,
}

impl QuizQuestion {
    /// Returns `true` if the question has text and its answer indexes an option.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.question_text.trim().is_empty()
            && self.options.len() >= 2
            && self.correct_answer < self.options.len()
    }
}

/// A study card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    /// Front of the card.
    #[serde(alias = "front")]
    pub term: String,
    /// Back of the card.
    #[serde(alias = "back")]
    pub definition: String,
    /// Illustrative example.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    /// Topic label.
    #[serde(default)]
    pub topic: String,
    /// Grade level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<u8>,
}

impl Flashcard {
    fn is_valid(&self) -> bool {
        !self.term.trim().is_empty() && !self.definition.trim().is_empty()
    }
}

/// Outcome of reading a structured generation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<T> {
    /// The response was read successfully.
    Generated(T),
    /// The response could not be used; `value` is the fixed fallback.
    Fallback {
        /// Fallback content.
        value: T,
        /// Why the response was rejected.
        reason: String,
    },
}

impl<T> Parsed<T> {
    /// Returns the content, generated or fallback.
    pub fn into_inner(self) -> T {
        match self {
            Self::Generated(value) | Self::Fallback { value, .. } => value,
        }
    }

    /// Returns `true` if the fallback was used.
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Removes a surrounding Markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    CODE_FENCE
        .as_ref()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |m| m.as_str())
}

fn parse_items<T, V>(raw: &str, what: &str, valid: V, fallback: fn() -> Vec<T>) -> Parsed<Vec<T>>
where
    T: DeserializeOwned,
    V: Fn(&T) -> bool,
{
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Parsed::Fallback {
            value: fallback(),
            reason: "empty response".to_string(),
        };
    }

    let reason = match serde_json::from_str::<Vec<T>>(body) {
        Ok(items) if items.is_empty() => format!("no {what} in response"),
        Ok(items) => match items.iter().position(|item| !valid(item)) {
            None => return Parsed::Generated(items),
            Some(idx) => format!("{what} {} is malformed", idx + 1),
        },
        Err(e) => format!("invalid JSON: {e}"),
    };

    Parsed::Fallback {
        value: fallback(),
        reason,
    }
}

/// Reads a quiz question array from a generation response.
#[must_use]
pub fn parse_quiz_questions(raw: &str) -> Parsed<Vec<QuizQuestion>> {
    parse_items(raw, "question", QuizQuestion::is_valid, fallback_quiz)
}

/// Reads a flashcard array from a generation response.
#[must_use]
pub fn parse_flashcards(raw: &str) -> Parsed<Vec<Flashcard>> {
    parse_items(raw, "flashcard", Flashcard::is_valid, fallback_flashcards)
}

/// The fixed two-question quiz used when generation output is unusable.
#[must_use]
pub fn fallback_quiz() -> Vec<QuizQuestion> {
    let question = |text: &str, options: [&str; 4], answer, difficulty: &str| QuizQuestion {
        question_text: text.to_string(),
        options: options.iter().map(ToString::to_string).collect(),
        correct_answer: answer,
        explanation: None,
        topic: "Geography".to_string(),
        difficulty: difficulty.to_string(),
    };
    vec![
        question(
            "What is the capital city of Guyana?",
            ["Georgetown", "Linden", "New Amsterdam", "Bartica"],
            0,
            "easy",
        ),
        question(
            "Which of these countries does NOT border Guyana?",
            ["Brazil", "Venezuela", "Suriname", "Colombia"],
            3,
            "medium",
        ),
    ]
}

/// The fixed three-card deck used when generation output is unusable.
#[must_use]
pub fn fallback_flashcards() -> Vec<Flashcard> {
    let card = |term: &str, definition: &str, topic: &str| Flashcard {
        term: term.to_string(),
        definition: definition.to_string(),
        example: None,
        topic: topic.to_string(),
        grade: None,
    };
    vec![
        card("What is the capital of Guyana?", "Georgetown", "Geography"),
        card(
            "What are the colors of the Guyanese flag?",
            "Green, yellow, red, black, and white",
            "National Symbols",
        ),
        card(
            "What is the largest river in Guyana?",
            "The Essequibo River",
            "Geography",
        ),
    ]
}

// ============================================================================
// Learning set
// ============================================================================

/// Generated summary, shaped like an `educational_content` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedContent {
    /// "<topic> - Summary".
    pub title: String,
    /// Short description.
    pub description: String,
    /// Source topic.
    pub topic_id: String,
    /// Grade level.
    pub grade: u8,
    /// Always "AI-Generated".
    pub source: String,
    /// Source text, at most 1000 characters.
    pub raw_content: String,
    /// Generated summary.
    pub processed_content: String,
}

/// Generated quiz, shaped like a `quizzes` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedQuiz {
    /// "<topic> - Quiz".
    pub title: String,
    /// Short description.
    pub description: String,
    /// Source topic.
    pub topic_id: String,
    /// Grade level.
    pub grade: u8,
    /// Difficulty requested.
    pub difficulty: Difficulty,
    /// Questions, generated or fallback.
    pub questions: Vec<QuizQuestion>,
}

/// Generated flashcard deck, shaped like a `flashcard_sets` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFlashcardSet {
    /// "<topic> - Flashcards".
    pub title: String,
    /// Short description.
    pub description: String,
    /// Source topic.
    pub topic_id: String,
    /// Grade level.
    pub grade: u8,
    /// Cards, generated or fallback.
    pub flashcards: Vec<Flashcard>,
}

/// Summary, quiz, and flashcards generated for one topic and grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearningSet {
    /// The summary.
    pub educational_content: GeneratedContent,
    /// The quiz.
    pub quiz: GeneratedQuiz,
    /// The flashcard deck.
    pub flashcard_set: GeneratedFlashcardSet,
}

/// Produces learning sets and standalone quizzes/decks from a [`TextGenerator`].
#[derive(Clone)]
pub struct LearningSetGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl std::fmt::Debug for LearningSetGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningSetGenerator").finish_non_exhaustive()
    }
}

impl LearningSetGenerator {
    /// Creates a generator backed by `generator`.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generates a learning set for `topic` at `grade`.
    ///
    /// The grade must already be validated. Unusable quiz or flashcard
    /// output is replaced by the fixed fallbacks.
    ///
    /// # Errors
    ///
    /// Returns `HeritageError::GenerationFailed` if any of the three service
    /// calls fails.
    pub async fn generate(&self, topic: &Topic, grade: u8) -> Result<LearningSet> {
        let title = topic.title.as_str();
        let source = prompt::truncate_chars(topic.content_text(), MAX_SOURCE_CHARS);
        let difficulty = Difficulty::default();

        let summary_prompt = prompt::summary_prompt(title, grade, source);
        let quiz_prompt =
            prompt::quiz_prompt(title, grade, difficulty, source, DEFAULT_QUIZ_QUESTIONS);
        let cards_prompt = prompt::flashcards_prompt(title, grade, source, DEFAULT_FLASHCARDS);

        info!(topic_id = %topic.id, grade, "Generating learning set");
        let (summary, quiz_raw, cards_raw) = futures::try_join!(
            self.generator.generate(&summary_prompt),
            self.generator.generate(&quiz_prompt),
            self.generator.generate(&cards_prompt),
        )
        .map_err(|e| {
            warn!(topic_id = %topic.id, error = %e, "Learning set generation failed");
            HeritageError::GenerationFailed(e)
        })?;

        let summary = summary.trim();
        let processed_content = if summary.is_empty() {
            warn!(topic_id = %topic.id, "Empty summary, using placeholder");
            SUMMARY_UNAVAILABLE.to_string()
        } else {
            summary.to_string()
        };

        let questions = log_fallback(parse_quiz_questions(&quiz_raw), &topic.id, "quiz");
        let flashcards = log_fallback(parse_flashcards(&cards_raw), &topic.id, "flashcards");

        Ok(LearningSet {
            educational_content: GeneratedContent {
                title: format!("{title} - Summary"),
                description: format!("A summary of {title} for grade {grade}"),
                topic_id: topic.id.clone(),
                grade,
                source: AI_GENERATED_SOURCE.to_string(),
                raw_content: source.to_string(),
                processed_content,
            },
            quiz: GeneratedQuiz {
                title: format!("{title} - Quiz"),
                description: format!("A quiz about {title} for grade {grade}"),
                topic_id: topic.id.clone(),
                grade,
                difficulty,
                questions,
            },
            flashcard_set: GeneratedFlashcardSet {
                title: format!("{title} - Flashcards"),
                description: format!("Flashcards for learning {title} concepts"),
                topic_id: topic.id.clone(),
                grade,
                flashcards,
            },
        })
    }

    /// Runs a question prompt; service failures also yield the fallback quiz.
    pub async fn questions_or_fallback(&self, prompt: &str) -> Parsed<Vec<QuizQuestion>> {
        match self.generator.generate(prompt).await {
            Ok(raw) => parse_quiz_questions(&raw),
            Err(e) => Parsed::Fallback {
                value: fallback_quiz(),
                reason: e.to_string(),
            },
        }
    }

    /// Runs a flashcard prompt; service failures also yield the fallback deck.
    pub async fn flashcards_or_fallback(&self, prompt: &str) -> Parsed<Vec<Flashcard>> {
        match self.generator.generate(prompt).await {
            Ok(raw) => parse_flashcards(&raw),
            Err(e) => Parsed::Fallback {
                value: fallback_flashcards(),
                reason: e.to_string(),
            },
        }
    }

    /// Runs a free-text prompt.
    ///
    /// # Errors
    ///
    /// Returns `HeritageError::GenerationFailed` if the service call fails.
    pub async fn text(&self, prompt: &str) -> Result<String> {
        self.generator
            .generate(prompt)
            .await
            .map_err(HeritageError::GenerationFailed)
    }
}

fn log_fallback<T>(parsed: Parsed<T>, topic_id: &str, what: &str) -> T {
    match parsed {
        Parsed::Generated(value) => {
            debug!(topic_id, what, "Parsed generated output");
            value
        }
        Parsed::Fallback { value, reason } => {
            warn!(topic_id, what, reason = %reason, "Unusable generated output, using fallback");
            value
        }
    }
}
