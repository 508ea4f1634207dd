//! Prompt builder.
//!
//! Every function here is a pure renderer: it takes the already-fetched
//! inputs and returns the instruction string sent to the generation service.
//! Missing inputs render as placeholder text rather than failing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default number of questions requested for a quiz.
pub const DEFAULT_QUIZ_QUESTIONS: usize = 10;

/// Default number of cards requested for a learning-set flashcard deck.
pub const DEFAULT_FLASHCARDS: usize = 8;

/// Default number of cards requested for a standalone deck.
pub const DEFAULT_DECK_SIZE: usize = 10;

/// Default number of questions requested for a practice exam.
pub const DEFAULT_EXAM_QUESTIONS: usize = 15;

/// Maximum number of characters of source text embedded in a generation prompt.
pub const MAX_SOURCE_CHARS: usize = 1000;

const NO_CONTENT: &str = "No content available";
const NO_CONVERSATION: &str = "This is the start of the conversation.";
const NO_CONTEXT: &str = "No specific content provided.";
const UNKNOWN: &str = "unknown";

/// Quiz difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Difficulty {
    /// Recall questions.
    Easy,
    /// The default level.
    #[default]
    Medium,
    /// Questions requiring reasoning.
    Challenging,
}

impl Difficulty {
    /// Parses a string into a `Difficulty`, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "challenging" | "hard" => Some(Self::Challenging),
            _ => None,
        }
    }

    /// Returns the lowercase label stored alongside quizzes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Challenging => "challenging",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid difficulty '{s}': expected one of 'easy', 'medium', 'challenging'"
            ))
        })
    }
}

impl Serialize for Difficulty {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Returns at most `max` characters of `text`, cut on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    text.char_indices().nth(max).map_or(text, |(idx, _)| &text[..idx])
}

fn source_or_placeholder(content: &str) -> &str {
    let content = content.trim();
    if content.is_empty() {
        NO_CONTENT
    } else {
        truncate_chars(content, MAX_SOURCE_CHARS)
    }
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    if text.trim().is_empty() {
        placeholder
    } else {
        text
    }
}

// ============================================================================
// Learning set prompts
// ============================================================================

/// Renders the summary prompt for a topic.
#[must_use]
pub fn summary_prompt(topic: &str, grade: u8, content: &str) -> String {
    render_summary(topic, grade, source_or_placeholder(content))
}

/// Renders the summary prompt over already-formatted content rows.
///
/// Unlike [`summary_prompt`] the context is not truncated; callers bound
/// each row themselves.
#[must_use]
pub fn context_summary_prompt(topic: &str, grade: u8, context: &str) -> String {
    render_summary(topic, grade, or_placeholder(context, NO_CONTENT))
}

fn render_summary(topic: &str, grade: u8, content: &str) -> String {
    let topic = or_placeholder(topic, UNKNOWN);
    format!(
        "Create an educational summary about \"{topic}\" for Guyanese grade {grade} Social Studies students.\n\
         \n\
         Based on the following educational content:\n\
         {content}\n\
         \n\
         Create a well-structured summary with these sections:\n\
         1. Introduction: Brief explanation of what this topic is about\n\
         2. Key Points: The most important facts and concepts (4-6 bullet points)\n\
         3. Important Vocabulary: Key terms and definitions (3-5 terms)\n\
         4. Summary: A concise paragraph summarizing the topic\n\
         \n\
         Make the language appropriate for grade {grade} students. Keep your response focused on \
         the factual content related to Guyanese Social Studies.\n"
    )
}

/// Renders the quiz prompt for a topic.
#[must_use]
pub fn quiz_prompt(
    topic: &str,
    grade: u8,
    difficulty: Difficulty,
    content: &str,
    question_count: usize,
) -> String {
    let topic = or_placeholder(topic, UNKNOWN);
    let content = source_or_placeholder(content);
    format!(
        "Generate {question_count} multiple-choice questions about \"{topic}\" for Guyanese grade {grade} Social Studies students.\n\
         \n\
         Based on the following educational content:\n\
         {content}\n\
         \n\
         The questions should be at {difficulty} difficulty level.\n\
         \n\
         Format the response as a JSON array where each question has:\n\
         - question_text: the question\n\
         - options: array of 4 possible answers\n\
         - correct_answer: the index of the correct option (0-3)\n\
         - explanation: brief explanation of why the answer is correct\n\
         - topic: \"{topic}\"\n\
         - difficulty: \"{difficulty}\"\n\
         \n\
         Make questions appropriate for grade {grade} students. Focus on factual knowledge related \
         to Guyanese Social Studies.\n"
    )
}

/// Renders the flashcard prompt for a topic.
#[must_use]
pub fn flashcards_prompt(topic: &str, grade: u8, content: &str, count: usize) -> String {
    let topic = or_placeholder(topic, UNKNOWN);
    let content = source_or_placeholder(content);
    format!(
        "Generate {count} flashcards about \"{topic}\" for Guyanese grade {grade} Social Studies students.\n\
         \n\
         Based on the following educational content:\n\
         {content}\n\
         \n\
         Format the response as a JSON array where each flashcard has:\n\
         - term: the term or concept (front of card)\n\
         - definition: the definition or explanation (back of card)\n\
         - example: a brief example to illustrate the concept (optional)\n\
         - topic: \"{topic}\"\n\
         - grade: {grade}\n\
         \n\
         Focus on key terms, concepts, and facts that are important for grade {grade} students to \
         understand about \"{topic}\".\n"
    )
}

// ============================================================================
// Other prompts
// ============================================================================

/// Renders the tutor prompt for a chat message.
///
/// `conversation` is the formatted recent history and `context` the
/// formatted educational content; either may be empty.
#[must_use]
pub fn chat_prompt(message: &str, conversation: &str, context: &str, grade: Option<u8>) -> String {
    let conversation = or_placeholder(conversation, NO_CONVERSATION);
    let context = or_placeholder(context, NO_CONTEXT);
    let grade = grade.map_or_else(|| UNKNOWN.to_string(), |g| g.to_string());
    format!(
        "You are HeritagePal, an educational AI tutor designed specifically for Guyanese primary \
         school students (grades 1-6) studying Social Studies. You should respond in a friendly, \
         encouraging, and age-appropriate manner.\n\
         \n\
         Your knowledge is based on the Guyanese Social Studies curriculum. You should only provide \
         information that is factually accurate and relevant to the Guyanese context. If you're not \
         sure about something, admit that you don't know rather than making up information.\n\
         \n\
         When explaining concepts, use simple language appropriate for the student's grade level. \
         For younger students (grades 1-3), use very simple explanations with short sentences. For \
         older students (grades 4-6), you can use more complex vocabulary and longer explanations.\n\
         \n\
         Recent conversation history:\n\
         {conversation}\n\
         \n\
         Relevant educational content:\n\
         {context}\n\
         \n\
         Student's grade level: {grade}\n\
         \n\
         Student's question: {message}\n\
         \n\
         Your response:\n"
    )
}

/// Renders the practice exam prompt for a grade.
#[must_use]
pub fn practice_exam_prompt(grade: u8, context: &str, question_count: usize) -> String {
    let context = or_placeholder(context, NO_CONTENT);
    format!(
        "Generate a comprehensive practice exam for Guyanese Social Studies for grade {grade} students.\n\
         \n\
         Based on the following educational content:\n\
         {context}\n\
         \n\
         Create a well-rounded practice exam with {question_count} multiple-choice questions \
         covering the topics provided.\n\
         Include a mix of difficulty levels appropriate for grade {grade}.\n\
         \n\
         Format the response as a JSON array where each question has:\n\
         - question_text: the question\n\
         - options: array of 4 possible answers\n\
         - correct_answer: the index of the correct option (0-3)\n\
         - topic: the topic this question relates to\n\
         - difficulty: \"easy\", \"medium\", or \"challenging\"\n"
    )
}

/// Renders the standalone flashcard deck prompt.
#[must_use]
pub fn flashcard_deck_prompt(context: &str, grade: Option<u8>, count: usize) -> String {
    let context = or_placeholder(context, NO_CONTENT);
    let grade = grade.map_or_else(|| "any grade".to_string(), |g| format!("grade {g}"));
    format!(
        "Generate educational flashcards for Guyanese primary school students studying Social Studies.\n\
         \n\
         Based on the following content:\n\
         {context}\n\
         \n\
         Create {count} flashcards that are appropriate for {grade} students.\n\
         Each flashcard should have a question on the front and the answer on the back.\n\
         Make the flashcards educational, accurate, and relevant to Guyanese Social Studies.\n\
         \n\
         Format the response as a JSON array where each flashcard has:\n\
         - front: the question or term\n\
         - back: the answer or definition\n\
         - topic: the specific topic this relates to\n"
    )
}

/// Renders the prompt for a quiz built from one stored piece of content.
#[must_use]
pub fn content_quiz_prompt(
    title: &str,
    grade: Option<u8>,
    processed_content: &str,
    difficulty: Difficulty,
    question_count: usize,
) -> String {
    let title = or_placeholder(title, UNKNOWN);
    let content = or_placeholder(processed_content, NO_CONTENT);
    let grade = grade.map_or_else(|| UNKNOWN.to_string(), |g| g.to_string());
    format!(
        "Using the following educational content for Guyanese Social Studies:\n\
         \n\
         Title: {title}\n\
         Grade: {grade}\n\
         \n\
         Processed Content:\n\
         {content}\n\
         \n\
         Generate a quiz with {question_count} multiple-choice questions about this content.\n\
         The difficulty level should be {difficulty} for grade {grade} students.\n\
         \n\
         Format the response as a JSON array where each question has:\n\
         - question_text: the question\n\
         - options: array of 4 possible answers\n\
         - correct_answer: the index of the correct option (0-3)\n\
         - explanation: brief explanation of the answer\n"
    )
}
