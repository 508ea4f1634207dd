//! HeritagePAL Store
//!
//! Typed access to the hosted curriculum database.
//!
//! This crate provides the record types shared by every table the service
//! reads or writes, the [`Store`] trait the rest of the workspace depends on,
//! a Supabase REST implementation ([`SupabaseStore`]) and an in-memory
//! implementation ([`MemoryStore`]) used for tests and offline development.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod memory;
pub mod supabase;

pub use memory::MemoryStore;
pub use supabase::{SupabaseConfig, SupabaseStore};

/// A specialized `Result` type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while talking to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("store API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the store.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// The response body did not match the expected shape.
    #[error("unexpected store response: {0}")]
    Decode(String),

    /// An insert succeeded but returned no representation.
    #[error("insert into '{table}' returned no row")]
    EmptyInsert {
        /// Table the insert targeted.
        table: Table,
    },

    /// A write was rejected by fault injection (in-memory store only).
    #[error("write to '{0}' rejected")]
    Rejected(Table),
}

impl StoreError {
    /// Creates a new `Api` error.
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

/// Tables of the hosted database touched by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Curriculum topics.
    Topics,
    /// Grade levels 1-6.
    Grades,
    /// Grade/topic assignments.
    GradeTopics,
    /// Summaries and uploaded educational material.
    EducationalContent,
    /// Multiple-choice quizzes.
    Quizzes,
    /// Scored quiz submissions.
    QuizResults,
    /// Generated practice exams.
    PracticeExams,
    /// Flashcard decks.
    FlashcardSets,
    /// Flashcard study sessions.
    FlashcardSessions,
    /// Sessions linking a generated learning set to a user.
    UserLearningSessions,
    /// Individual chat messages.
    ChatMessages,
    /// Chat sessions owned by signed-in users.
    UserChatSessions,
    /// Student profiles.
    Users,
    /// Administrator profiles.
    Admins,
    /// Grades a student has chosen.
    UserGrades,
    /// Topic page views.
    UserTopicHistory,
}

impl Table {
    /// Returns the table name as used in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Topics => "topics",
            Self::Grades => "grades",
            Self::GradeTopics => "grade_topics",
            Self::EducationalContent => "educational_content",
            Self::Quizzes => "quizzes",
            Self::QuizResults => "quiz_results",
            Self::PracticeExams => "practice_exams",
            Self::FlashcardSets => "flashcard_sets",
            Self::FlashcardSessions => "flashcard_sessions",
            Self::UserLearningSessions => "user_learning_sessions",
            Self::ChatMessages => "chat_messages",
            Self::UserChatSessions => "user_chat_sessions",
            Self::Users => "users",
            Self::Admins => "admins",
            Self::UserGrades => "user_grades",
            Self::UserTopicHistory => "user_topic_history",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Topics and grades
// ============================================================================

/// A curriculum topic. Its `content` is the source text for generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Unique identifier.
    pub id: String,
    /// Topic title.
    pub title: String,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
    /// Main topic text.
    #[serde(default)]
    pub content: Option<String>,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Topic {
    /// Returns the topic text, or an empty string when none is stored.
    #[must_use]
    pub fn content_text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Fields for a new topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTopic {
    /// Topic title.
    pub title: String,
    /// Short description.
    pub description: Option<String>,
    /// Main topic text.
    pub content: String,
}

/// Partial update of a topic; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicUpdate {
    /// New title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New topic text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A grade level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    /// Unique identifier.
    pub id: String,
    /// Numeric level, 1 through 6.
    pub level: u8,
    /// Display name, e.g. "Grade 1".
    #[serde(default)]
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Fields for a new grade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGrade {
    /// Numeric level, 1 through 6.
    pub level: u8,
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
}

/// Assignment of a topic to a grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeTopic {
    /// Grade identifier.
    pub grade_id: String,
    /// Topic identifier.
    pub topic_id: String,
}

/// A grade chosen by a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGrade {
    /// Student identifier.
    pub user_id: String,
    /// Grade identifier.
    pub grade_id: String,
}

/// One recorded view of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicView {
    /// Viewer.
    pub user_id: String,
    /// Viewed topic.
    pub topic_id: String,
    /// When the topic was opened.
    pub viewed_at: DateTime<Utc>,
}

// ============================================================================
// Artifacts
// ============================================================================

/// A stored summary or piece of educational material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationalContent {
    /// Unique identifier.
    pub id: String,
    /// Content title.
    pub title: String,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
    /// Topic the content belongs to.
    #[serde(default)]
    pub topic_id: Option<String>,
    /// Grade level the content was written for.
    #[serde(default)]
    pub grade: Option<u8>,
    /// Origin of the content, e.g. "AI-Generated".
    #[serde(default)]
    pub source: Option<String>,
    /// Original unprocessed text.
    #[serde(default)]
    pub raw_content: Option<String>,
    /// Processed or generated text.
    #[serde(default)]
    pub processed_content: Option<String>,
    /// Owner, for generated content.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Whether the content was produced by the generation service.
    #[serde(default)]
    pub is_ai_generated: bool,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields for new educational content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEducationalContent {
    /// Content title.
    pub title: String,
    /// Short description.
    pub description: Option<String>,
    /// Topic the content belongs to.
    pub topic_id: Option<String>,
    /// Grade level.
    pub grade: Option<u8>,
    /// Origin of the content.
    pub source: Option<String>,
    /// Original unprocessed text.
    pub raw_content: Option<String>,
    /// Processed or generated text.
    pub processed_content: Option<String>,
    /// Owner.
    pub user_id: Option<String>,
    /// Whether the content was generated.
    pub is_ai_generated: bool,
}

/// A stored quiz. Questions are kept as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizRecord {
    /// Unique identifier.
    pub id: String,
    /// Quiz title.
    pub title: String,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
    /// Topic the quiz covers.
    #[serde(default)]
    pub topic_id: Option<String>,
    /// Grade level.
    #[serde(default)]
    pub grade: Option<u8>,
    /// Difficulty label.
    #[serde(default)]
    pub difficulty: Option<String>,
    /// Serialized question array.
    #[serde(default, deserialize_with = "json_text")]
    pub questions: String,
    /// Owner, for generated quizzes.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Whether the quiz was produced by the generation service.
    #[serde(default)]
    pub is_ai_generated: bool,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields for a new quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuiz {
    /// Quiz title.
    pub title: String,
    /// Short description.
    pub description: Option<String>,
    /// Topic the quiz covers.
    pub topic_id: Option<String>,
    /// Grade level.
    pub grade: Option<u8>,
    /// Difficulty label.
    pub difficulty: Option<String>,
    /// Serialized question array.
    pub questions: String,
    /// Owner.
    pub user_id: Option<String>,
    /// Whether the quiz was generated.
    pub is_ai_generated: bool,
}

/// A scored quiz submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResultRecord {
    /// Unique identifier.
    pub id: String,
    /// Quiz that was answered.
    pub quiz_id: String,
    /// Anonymous session identifier.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Signed-in user.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Percentage score.
    pub score: u32,
    /// Number of correct answers.
    pub correct_count: u32,
    /// Number of questions in the quiz.
    pub total_questions: u32,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields for a new quiz result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuizResult {
    /// Quiz that was answered.
    pub quiz_id: String,
    /// Anonymous session identifier.
    pub session_id: Option<String>,
    /// Signed-in user.
    pub user_id: Option<String>,
    /// Percentage score.
    pub score: u32,
    /// Number of correct answers.
    pub correct_count: u32,
    /// Number of questions in the quiz.
    pub total_questions: u32,
}

/// A stored practice exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeExamRecord {
    /// Unique identifier.
    pub id: String,
    /// Exam title.
    pub title: String,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
    /// Grade the exam targets.
    pub grade_id: String,
    /// Serialized question array.
    #[serde(default, deserialize_with = "json_text")]
    pub questions: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields for a new practice exam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPracticeExam {
    /// Exam title.
    pub title: String,
    /// Short description.
    pub description: Option<String>,
    /// Grade the exam targets.
    pub grade_id: String,
    /// Serialized question array.
    pub questions: String,
}

/// A stored flashcard deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardSetRecord {
    /// Unique identifier.
    pub id: String,
    /// Deck title.
    pub title: String,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
    /// Topic the deck covers.
    #[serde(default)]
    pub topic_id: Option<String>,
    /// Grade level.
    #[serde(default)]
    pub grade: Option<u8>,
    /// Owner.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Whether the deck was generated.
    #[serde(default)]
    pub is_ai_generated: bool,
    /// Card array as stored.
    #[serde(default)]
    pub flashcards: serde_json::Value,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields for a new flashcard deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFlashcardSet {
    /// Deck title.
    pub title: String,
    /// Short description.
    pub description: Option<String>,
    /// Topic the deck covers.
    pub topic_id: Option<String>,
    /// Grade level.
    pub grade: Option<u8>,
    /// Owner.
    pub user_id: Option<String>,
    /// Whether the deck was generated.
    pub is_ai_generated: bool,
    /// Card array.
    pub flashcards: serde_json::Value,
}

/// A flashcard study session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardSessionRecord {
    /// Unique identifier.
    pub id: String,
    /// Signed-in user.
    pub user_id: String,
    /// Client-facing session identifier.
    pub session_id: String,
    /// Topic studied.
    #[serde(default)]
    pub topic_id: Option<String>,
    /// Number of cards in the deck.
    pub flashcard_count: u32,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields for a new flashcard session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFlashcardSession {
    /// Signed-in user.
    pub user_id: String,
    /// Client-facing session identifier.
    pub session_id: String,
    /// Topic studied.
    pub topic_id: Option<String>,
    /// Number of cards in the deck.
    pub flashcard_count: u32,
}

// ============================================================================
// Learning sessions
// ============================================================================

/// Links a persisted learning set to the user who generated it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningSessionRecord {
    /// Unique identifier.
    pub id: String,
    /// Owner.
    pub user_id: String,
    /// Topic the set was generated from.
    pub topic_id: String,
    /// Grade level.
    pub grade: u8,
    /// Summary row.
    pub content_id: String,
    /// Quiz row.
    pub quiz_id: String,
    /// Flashcard deck row.
    pub flashcard_set_id: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields for a new learning session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLearningSession {
    /// Owner.
    pub user_id: String,
    /// Topic the set was generated from.
    pub topic_id: String,
    /// Grade level.
    pub grade: u8,
    /// Summary row.
    pub content_id: String,
    /// Quiz row.
    pub quiz_id: String,
    /// Flashcard deck row.
    pub flashcard_set_id: String,
}

/// Identifier and title of a joined row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRef {
    /// Row identifier.
    pub id: String,
    /// Row title.
    pub title: String,
}

/// A learning session joined with the titles of everything it links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningHistoryEntry {
    /// Session identifier.
    pub id: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Grade level.
    pub grade: u8,
    /// Linked topic.
    #[serde(default)]
    pub topics: Option<TitleRef>,
    /// Linked summary.
    #[serde(default)]
    pub educational_content: Option<TitleRef>,
    /// Linked quiz.
    #[serde(default)]
    pub quizzes: Option<TitleRef>,
    /// Linked flashcard deck.
    #[serde(default)]
    pub flashcard_sets: Option<TitleRef>,
}

// ============================================================================
// Chat
// ============================================================================

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The student.
    User,
    /// The tutor.
    Assistant,
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Conversation identifier.
    pub session_id: String,
    /// Author.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A chat session owned by a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSessionRecord {
    /// Owner.
    pub user_id: String,
    /// Conversation identifier.
    pub session_id: String,
    /// First words of the opening message.
    #[serde(default)]
    pub topic: Option<String>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Users
// ============================================================================

/// Profile of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User identifier issued by the auth service.
    pub id: String,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Role, `"admin"` or `"user"`.
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_string()
}

impl UserProfile {
    /// Returns `true` if the caller may use admin routes.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Filter for educational content listings. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    /// Restrict to these topics.
    pub topic_ids: Option<Vec<String>>,
    /// Restrict to this grade level.
    pub grade: Option<u8>,
    /// Case-insensitive match against title, description and processed text.
    pub query: Option<String>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
}

/// Filter for quiz listings. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct QuizFilter {
    /// Restrict to these topics.
    pub topic_ids: Option<Vec<String>>,
    /// Restrict to this difficulty label.
    pub difficulty: Option<String>,
}

/// Filter for flashcard deck listings. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct FlashcardFilter {
    /// Restrict to this topic.
    pub topic_id: Option<String>,
    /// Restrict to this grade level.
    pub grade: Option<u8>,
}

// ============================================================================
// Store trait
// ============================================================================

/// Persistence and authentication operations used by the service.
///
/// Every call is an independent request against the store; no operation is
/// transactional across calls.
#[async_trait]
pub trait Store: Send + Sync {
    /// Lists all topics, newest first.
    async fn list_topics(&self) -> StoreResult<Vec<Topic>>;
    /// Fetches a topic by id.
    async fn get_topic(&self, id: &str) -> StoreResult<Option<Topic>>;
    /// Finds topics whose title matches exactly.
    async fn find_topics_by_title(&self, title: &str, limit: usize) -> StoreResult<Vec<Topic>>;
    /// Creates a topic.
    async fn create_topic(&self, topic: NewTopic) -> StoreResult<Topic>;
    /// Updates a topic, returning the new row if it exists.
    async fn update_topic(&self, id: &str, update: TopicUpdate) -> StoreResult<Option<Topic>>;
    /// Deletes a topic and its grade assignments. Returns `false` if absent.
    async fn delete_topic(&self, id: &str) -> StoreResult<bool>;

    /// Lists grades ordered by level.
    async fn list_grades(&self) -> StoreResult<Vec<Grade>>;
    /// Fetches a grade by id.
    async fn get_grade(&self, id: &str) -> StoreResult<Option<Grade>>;
    /// Fetches a grade by numeric level.
    async fn grade_by_level(&self, level: u8) -> StoreResult<Option<Grade>>;
    /// Creates a grade.
    async fn create_grade(&self, grade: NewGrade) -> StoreResult<Grade>;
    /// Lists every grade/topic assignment.
    async fn list_grade_topics(&self) -> StoreResult<Vec<GradeTopic>>;
    /// Assigns a topic to a grade.
    async fn assign_topic_to_grade(&self, grade_id: &str, topic_id: &str) -> StoreResult<()>;
    /// Removes an assignment. Returns `false` if absent.
    async fn remove_topic_from_grade(&self, grade_id: &str, topic_id: &str) -> StoreResult<bool>;
    /// Replaces every grade assignment of a topic with `grade_ids`.
    async fn replace_topic_grades(
        &self,
        topic_id: &str,
        grade_ids: &[String],
    ) -> StoreResult<Vec<GradeTopic>>;
    /// Records that a user opened a topic.
    async fn record_topic_view(&self, view: TopicView) -> StoreResult<()>;

    /// Lists the grades a user has chosen, ordered by level.
    async fn list_user_grades(&self, user_id: &str) -> StoreResult<Vec<Grade>>;
    /// Adds a grade to a user's choices.
    async fn assign_user_grade(&self, user_id: &str, grade_id: &str) -> StoreResult<UserGrade>;
    /// Removes a grade from a user's choices. Returns `false` if absent.
    async fn remove_user_grade(&self, user_id: &str, grade_id: &str) -> StoreResult<bool>;

    /// Inserts educational content.
    async fn insert_content(&self, content: NewEducationalContent)
        -> StoreResult<EducationalContent>;
    /// Fetches educational content by id.
    async fn get_content(&self, id: &str) -> StoreResult<Option<EducationalContent>>;
    /// Lists educational content matching the filter.
    async fn list_content(&self, filter: ContentFilter) -> StoreResult<Vec<EducationalContent>>;
    /// Deletes educational content. Returns `false` if absent.
    async fn delete_content(&self, id: &str) -> StoreResult<bool>;

    /// Inserts a quiz.
    async fn insert_quiz(&self, quiz: NewQuiz) -> StoreResult<QuizRecord>;
    /// Fetches a quiz by id.
    async fn get_quiz(&self, id: &str) -> StoreResult<Option<QuizRecord>>;
    /// Lists quizzes matching the filter.
    async fn list_quizzes(&self, filter: QuizFilter) -> StoreResult<Vec<QuizRecord>>;
    /// Deletes a quiz. Returns `false` if absent.
    async fn delete_quiz(&self, id: &str) -> StoreResult<bool>;
    /// Records a scored submission.
    async fn insert_quiz_result(&self, result: NewQuizResult) -> StoreResult<QuizResultRecord>;
    /// Lists a user's scored submissions, newest first.
    async fn list_quiz_results(&self, user_id: &str) -> StoreResult<Vec<QuizResultRecord>>;
    /// Stores a practice exam.
    async fn insert_practice_exam(&self, exam: NewPracticeExam) -> StoreResult<PracticeExamRecord>;
    /// Lists the topics that have at least one quiz, ordered by title.
    async fn list_quiz_topics(&self) -> StoreResult<Vec<Topic>>;

    /// Inserts a flashcard deck.
    async fn insert_flashcard_set(&self, set: NewFlashcardSet) -> StoreResult<FlashcardSetRecord>;
    /// Fetches a flashcard deck by id.
    async fn get_flashcard_set(&self, id: &str) -> StoreResult<Option<FlashcardSetRecord>>;
    /// Lists flashcard decks matching the filter.
    async fn list_flashcard_sets(
        &self,
        filter: FlashcardFilter,
    ) -> StoreResult<Vec<FlashcardSetRecord>>;
    /// Deletes a flashcard deck. Returns `false` if absent.
    async fn delete_flashcard_set(&self, id: &str) -> StoreResult<bool>;
    /// Records a flashcard study session.
    async fn insert_flashcard_session(
        &self,
        session: NewFlashcardSession,
    ) -> StoreResult<FlashcardSessionRecord>;
    /// Lists a user's flashcard sessions, newest first.
    async fn list_flashcard_sessions(&self, user_id: &str)
        -> StoreResult<Vec<FlashcardSessionRecord>>;

    /// Inserts a learning session.
    async fn insert_learning_session(
        &self,
        session: NewLearningSession,
    ) -> StoreResult<LearningSessionRecord>;
    /// Lists a user's learning sessions joined with linked titles, newest first.
    async fn learning_history(&self, user_id: &str) -> StoreResult<Vec<LearningHistoryEntry>>;

    /// Appends a chat message.
    async fn insert_chat_message(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
    ) -> StoreResult<()>;
    /// Returns up to `limit` most recent messages of a session, oldest first.
    async fn recent_chat_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<ChatMessage>>;
    /// Returns every message of a session, oldest first.
    async fn chat_messages(&self, session_id: &str) -> StoreResult<Vec<ChatMessage>>;
    /// Registers a chat session for a signed-in user.
    async fn insert_chat_session(
        &self,
        user_id: &str,
        session_id: &str,
        topic: &str,
    ) -> StoreResult<()>;
    /// Lists a user's chat sessions, newest first.
    async fn list_chat_sessions(&self, user_id: &str) -> StoreResult<Vec<ChatSessionRecord>>;

    /// Resolves a bearer token to a profile, or `None` if the token is not valid.
    async fn resolve_user(&self, token: &str) -> StoreResult<Option<UserProfile>>;
}

/// Accepts a JSON column stored either as text or as native JSON and keeps it as text.
fn json_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_table_display() {
        assert_eq!(Table::UserLearningSessions.to_string(), "user_learning_sessions");
        assert_eq!(Table::EducationalContent.as_str(), "educational_content");
    }

    #[test]
    fn test_quiz_questions_accept_text_or_json() {
        let as_text = r#"{"id":"q1","title":"Quiz","questions":"[{\"a\":1}]"}"#;
        let quiz: QuizRecord = serde_json::from_str(as_text).unwrap();
        assert_eq!(quiz.questions, r#"[{"a":1}]"#);

        let as_json = r#"{"id":"q1","title":"Quiz","questions":[{"a":1}]}"#;
        let quiz: QuizRecord = serde_json::from_str(as_json).unwrap();
        assert_eq!(quiz.questions, r#"[{"a":1}]"#);
    }

    #[test]
    fn test_user_profile_defaults_to_user_role() {
        let profile: UserProfile = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        assert_eq!(profile.role, "user");
        assert!(!profile.is_admin());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::api(404, "relation does not exist");
        assert_eq!(
            err.to_string(),
            "store API error (404): relation does not exist"
        );

        let err = StoreError::Rejected(Table::Quizzes);
        assert!(err.to_string().contains("quizzes"));

        assert_eq!(Table::UserTopicHistory.to_string(), "user_topic_history");
    }
}
