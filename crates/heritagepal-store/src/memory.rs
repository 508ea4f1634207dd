//! In-memory store.
//!
//! Backs tests and `--in-memory` development runs. Rows live in plain vectors
//! guarded by a tokio `RwLock`; insertion order doubles as creation order.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{
    ChatMessage, ChatRole, ChatSessionRecord, ContentFilter, EducationalContent, FlashcardFilter,
    FlashcardSessionRecord, FlashcardSetRecord, Grade, GradeTopic, LearningHistoryEntry,
    LearningSessionRecord, NewEducationalContent, NewFlashcardSession, NewFlashcardSet, NewGrade,
    NewLearningSession, NewPracticeExam, NewQuiz, NewQuizResult, NewTopic, PracticeExamRecord,
    QuizFilter, QuizRecord, QuizResultRecord, Store, StoreError, StoreResult, Table, TitleRef,
    Topic, TopicUpdate, TopicView, UserGrade, UserProfile,
};

/// Seed curriculum: topic title, description, content and the grades it is taught in.
const SEED_TOPICS: &[(&str, &str, &str, &[u8])] = &[
    (
        "My Family",
        "Learn about family members and relationships",
        "Families come in many shapes and sizes. Family members care for each other and share traditions.",
        &[1, 2],
    ),
    (
        "My School",
        "Learn about school and classroom life",
        "School is a place where we learn, play and make friends. Teachers help us learn new things.",
        &[1, 2],
    ),
    (
        "Our Community",
        "Learn about the people and places in our community",
        "A community is a group of people who live and work together. Community helpers keep us safe and healthy.",
        &[1, 2, 3],
    ),
    (
        "Guyanese Culture",
        "Learn about the cultures, festivals and food of Guyana",
        "Guyana is called the Land of Six Peoples. Festivals such as Mashramani, Diwali, Phagwah and Eid are celebrated across the country.",
        &[3, 4],
    ),
    (
        "Natural Resources",
        "Learn about the natural resources of Guyana",
        "Guyana is rich in natural resources such as gold, bauxite, timber and fertile land along the coast.",
        &[3, 4, 5],
    ),
    (
        "Geography of Guyana",
        "Learn about the regions, rivers and landforms of Guyana",
        "Guyana is on the north coast of South America. Its major rivers are the Essequibo, Demerara and Berbice, and Kaieteur Falls is on the Potaro River.",
        &[3, 4, 5],
    ),
    (
        "Government and Citizenship",
        "Learn about how Guyana is governed",
        "Guyana is a cooperative republic. Citizens have rights and responsibilities, including voting in national elections.",
        &[5, 6],
    ),
    (
        "Guyanese History",
        "Learn about the history of Guyana",
        "Guyana was colonised by the Dutch and later the British. It gained independence on 26 May 1966 and became a republic in 1970.",
        &[5, 6],
    ),
    (
        "Agriculture and Industry",
        "Learn about farming and industry in Guyana",
        "Sugar, rice and fishing are important industries in Guyana. Mining and forestry also provide jobs.",
        &[5, 6],
    ),
    (
        "Environmental Conservation",
        "Learn how to protect Guyana's environment",
        "Guyana's rainforests store carbon and are home to many animals. Protecting them helps the whole world.",
        &[4, 5, 6],
    ),
];

const GRADE_DESCRIPTIONS: [&str; 6] = [
    "First grade primary school students",
    "Second grade primary school students",
    "Third grade primary school students",
    "Fourth grade primary school students",
    "Fifth grade primary school students",
    "Sixth grade primary school students",
];

#[derive(Debug, Default)]
struct Tables {
    topics: Vec<Topic>,
    grades: Vec<Grade>,
    grade_topics: Vec<GradeTopic>,
    content: Vec<EducationalContent>,
    quizzes: Vec<QuizRecord>,
    quiz_results: Vec<QuizResultRecord>,
    practice_exams: Vec<PracticeExamRecord>,
    flashcard_sets: Vec<FlashcardSetRecord>,
    flashcard_sessions: Vec<FlashcardSessionRecord>,
    learning_sessions: Vec<LearningSessionRecord>,
    chat_messages: Vec<ChatMessage>,
    chat_sessions: Vec<ChatSessionRecord>,
    user_grades: Vec<UserGrade>,
    topic_views: Vec<TopicView>,
    tokens: HashMap<String, UserProfile>,
}

/// A [`Store`] kept entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    rejected: RwLock<HashSet<Table>>,
    rejected_deletes: RwLock<HashSet<Table>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding grades 1-6 and the default topic list.
    #[must_use]
    pub fn seeded() -> Self {
        let mut tables = Tables::default();

        for (level, description) in (1u8..).zip(GRADE_DESCRIPTIONS) {
            tables.grades.push(Grade {
                id: new_id(),
                level,
                name: format!("Grade {level}"),
                description: Some(description.to_string()),
            });
        }

        for (title, description, content, levels) in SEED_TOPICS {
            let topic = Topic {
                id: new_id(),
                title: (*title).to_string(),
                description: Some((*description).to_string()),
                content: Some((*content).to_string()),
                created_at: Some(Utc::now()),
            };
            for level in *levels {
                if let Some(grade) = tables.grades.iter().find(|g| g.level == *level) {
                    tables.grade_topics.push(GradeTopic {
                        grade_id: grade.id.clone(),
                        topic_id: topic.id.clone(),
                    });
                }
            }
            tables.topics.push(topic);
        }

        Self {
            tables: RwLock::new(tables),
            ..Self::default()
        }
    }

    /// Makes `token` resolve to `profile`.
    pub async fn register_token(&self, token: impl Into<String>, profile: UserProfile) {
        self.tables.write().await.tokens.insert(token.into(), profile);
    }

    /// Makes every later insert into `table` fail.
    pub async fn reject_inserts_into(&self, table: Table) {
        self.rejected.write().await.insert(table);
    }

    /// Lets inserts into every table succeed again.
    pub async fn accept_all_inserts(&self) {
        self.rejected.write().await.clear();
    }

    /// Makes every later delete from `table` fail.
    pub async fn reject_deletes_from(&self, table: Table) {
        self.rejected_deletes.write().await.insert(table);
    }

    /// Number of rows currently held in `table`.
    pub async fn row_count(&self, table: Table) -> usize {
        let tables = self.tables.read().await;
        match table {
            Table::Topics => tables.topics.len(),
            Table::Grades => tables.grades.len(),
            Table::GradeTopics => tables.grade_topics.len(),
            Table::EducationalContent => tables.content.len(),
            Table::Quizzes => tables.quizzes.len(),
            Table::QuizResults => tables.quiz_results.len(),
            Table::PracticeExams => tables.practice_exams.len(),
            Table::FlashcardSets => tables.flashcard_sets.len(),
            Table::FlashcardSessions => tables.flashcard_sessions.len(),
            Table::UserLearningSessions => tables.learning_sessions.len(),
            Table::ChatMessages => tables.chat_messages.len(),
            Table::UserChatSessions => tables.chat_sessions.len(),
            Table::Users => tables.tokens.values().filter(|p| !p.is_admin()).count(),
            Table::Admins => tables.tokens.values().filter(|p| p.is_admin()).count(),
            Table::UserGrades => tables.user_grades.len(),
            Table::UserTopicHistory => tables.topic_views.len(),
        }
    }

    async fn check_insert(&self, table: Table) -> StoreResult<()> {
        if self.rejected.read().await.contains(&table) {
            debug!(table = %table, "Rejecting insert");
            return Err(StoreError::Rejected(table));
        }
        Ok(())
    }

    async fn check_delete(&self, table: Table) -> StoreResult<()> {
        if self.rejected_deletes.read().await.contains(&table) {
            debug!(table = %table, "Rejecting delete");
            return Err(StoreError::Rejected(table));
        }
        Ok(())
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn title_ref(id: &str, title: Option<&str>) -> Option<TitleRef> {
    title.map(|title| TitleRef {
        id: id.to_string(),
        title: title.to_string(),
    })
}

fn contains_ignore_case(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_topics(&self) -> StoreResult<Vec<Topic>> {
        Ok(self.tables.read().await.topics.iter().rev().cloned().collect())
    }

    async fn get_topic(&self, id: &str) -> StoreResult<Option<Topic>> {
        let tables = self.tables.read().await;
        Ok(tables.topics.iter().find(|t| t.id == id).cloned())
    }

    async fn find_topics_by_title(&self, title: &str, limit: usize) -> StoreResult<Vec<Topic>> {
        let tables = self.tables.read().await;
        Ok(tables
            .topics
            .iter()
            .filter(|t| t.title == title)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_topic(&self, topic: NewTopic) -> StoreResult<Topic> {
        self.check_insert(Table::Topics).await?;
        let row = Topic {
            id: new_id(),
            title: topic.title,
            description: topic.description,
            content: Some(topic.content),
            created_at: Some(Utc::now()),
        };
        self.tables.write().await.topics.push(row.clone());
        Ok(row)
    }

    async fn update_topic(&self, id: &str, update: TopicUpdate) -> StoreResult<Option<Topic>> {
        let mut tables = self.tables.write().await;
        let Some(topic) = tables.topics.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        if let Some(title) = update.title {
            topic.title = title;
        }
        if let Some(description) = update.description {
            topic.description = Some(description);
        }
        if let Some(content) = update.content {
            topic.content = Some(content);
        }
        Ok(Some(topic.clone()))
    }

    async fn delete_topic(&self, id: &str) -> StoreResult<bool> {
        self.check_delete(Table::Topics).await?;
        let mut tables = self.tables.write().await;
        tables.grade_topics.retain(|gt| gt.topic_id != id);
        let before = tables.topics.len();
        tables.topics.retain(|t| t.id != id);
        Ok(tables.topics.len() != before)
    }

    async fn list_grades(&self) -> StoreResult<Vec<Grade>> {
        let mut grades = self.tables.read().await.grades.clone();
        grades.sort_by_key(|g| g.level);
        Ok(grades)
    }

    async fn get_grade(&self, id: &str) -> StoreResult<Option<Grade>> {
        let tables = self.tables.read().await;
        Ok(tables.grades.iter().find(|g| g.id == id).cloned())
    }

    async fn grade_by_level(&self, level: u8) -> StoreResult<Option<Grade>> {
        let tables = self.tables.read().await;
        Ok(tables.grades.iter().find(|g| g.level == level).cloned())
    }

    async fn create_grade(&self, grade: NewGrade) -> StoreResult<Grade> {
        self.check_insert(Table::Grades).await?;
        let row = Grade {
            id: new_id(),
            level: grade.level,
            name: grade.name,
            description: grade.description,
        };
        self.tables.write().await.grades.push(row.clone());
        Ok(row)
    }

    async fn list_grade_topics(&self) -> StoreResult<Vec<GradeTopic>> {
        Ok(self.tables.read().await.grade_topics.clone())
    }

    async fn assign_topic_to_grade(&self, grade_id: &str, topic_id: &str) -> StoreResult<()> {
        self.check_insert(Table::GradeTopics).await?;
        let mut tables = self.tables.write().await;
        let exists = tables
            .grade_topics
            .iter()
            .any(|gt| gt.grade_id == grade_id && gt.topic_id == topic_id);
        if exists {
            return Err(StoreError::api(
                409,
                "duplicate key value violates unique constraint \"grade_topics_pkey\"",
            ));
        }
        tables.grade_topics.push(GradeTopic {
            grade_id: grade_id.to_string(),
            topic_id: topic_id.to_string(),
        });
        Ok(())
    }

    async fn remove_topic_from_grade(&self, grade_id: &str, topic_id: &str) -> StoreResult<bool> {
        self.check_delete(Table::GradeTopics).await?;
        let mut tables = self.tables.write().await;
        let before = tables.grade_topics.len();
        tables
            .grade_topics
            .retain(|gt| !(gt.grade_id == grade_id && gt.topic_id == topic_id));
        Ok(tables.grade_topics.len() != before)
    }

    async fn replace_topic_grades(
        &self,
        topic_id: &str,
        grade_ids: &[String],
    ) -> StoreResult<Vec<GradeTopic>> {
        self.check_delete(Table::GradeTopics).await?;
        self.check_insert(Table::GradeTopics).await?;
        let mut tables = self.tables.write().await;
        tables.grade_topics.retain(|gt| gt.topic_id != topic_id);

        let mut assigned: Vec<GradeTopic> = Vec::with_capacity(grade_ids.len());
        for grade_id in grade_ids {
            if assigned.iter().any(|gt| &gt.grade_id == grade_id) {
                continue;
            }
            assigned.push(GradeTopic {
                grade_id: grade_id.clone(),
                topic_id: topic_id.to_string(),
            });
        }
        tables.grade_topics.extend(assigned.iter().cloned());
        Ok(assigned)
    }

    async fn record_topic_view(&self, view: TopicView) -> StoreResult<()> {
        self.check_insert(Table::UserTopicHistory).await?;
        self.tables.write().await.topic_views.push(view);
        Ok(())
    }

    async fn list_user_grades(&self, user_id: &str) -> StoreResult<Vec<Grade>> {
        let tables = self.tables.read().await;
        let mut grades: Vec<Grade> = tables
            .user_grades
            .iter()
            .filter(|ug| ug.user_id == user_id)
            .filter_map(|ug| tables.grades.iter().find(|g| g.id == ug.grade_id))
            .cloned()
            .collect();
        grades.sort_by_key(|g| g.level);
        Ok(grades)
    }

    async fn assign_user_grade(&self, user_id: &str, grade_id: &str) -> StoreResult<UserGrade> {
        self.check_insert(Table::UserGrades).await?;
        let mut tables = self.tables.write().await;
        let row = UserGrade {
            user_id: user_id.to_string(),
            grade_id: grade_id.to_string(),
        };
        if tables.user_grades.contains(&row) {
            return Err(StoreError::api(
                409,
                "duplicate key value violates unique constraint \"user_grades_pkey\"",
            ));
        }
        tables.user_grades.push(row.clone());
        Ok(row)
    }

    async fn remove_user_grade(&self, user_id: &str, grade_id: &str) -> StoreResult<bool> {
        self.check_delete(Table::UserGrades).await?;
        let mut tables = self.tables.write().await;
        let before = tables.user_grades.len();
        tables
            .user_grades
            .retain(|ug| !(ug.user_id == user_id && ug.grade_id == grade_id));
        Ok(tables.user_grades.len() != before)
    }

    async fn insert_content(
        &self,
        content: NewEducationalContent,
    ) -> StoreResult<EducationalContent> {
        self.check_insert(Table::EducationalContent).await?;
        let row = EducationalContent {
            id: new_id(),
            title: content.title,
            description: content.description,
            topic_id: content.topic_id,
            grade: content.grade,
            source: content.source,
            raw_content: content.raw_content,
            processed_content: content.processed_content,
            user_id: content.user_id,
            is_ai_generated: content.is_ai_generated,
            created_at: Some(Utc::now()),
        };
        self.tables.write().await.content.push(row.clone());
        Ok(row)
    }

    async fn get_content(&self, id: &str) -> StoreResult<Option<EducationalContent>> {
        let tables = self.tables.read().await;
        Ok(tables.content.iter().find(|c| c.id == id).cloned())
    }

    async fn list_content(&self, filter: ContentFilter) -> StoreResult<Vec<EducationalContent>> {
        let tables = self.tables.read().await;
        let query = filter.query.map(|q| q.to_lowercase());
        let rows = tables
            .content
            .iter()
            .rev()
            .filter(|c| {
                filter.topic_ids.as_ref().map_or(true, |ids| {
                    c.topic_id.as_ref().is_some_and(|id| ids.contains(id))
                })
            })
            .filter(|c| filter.grade.map_or(true, |grade| c.grade == Some(grade)))
            .filter(|c| {
                query.as_deref().map_or(true, |q| {
                    contains_ignore_case(Some(&c.title), q)
                        || contains_ignore_case(c.description.as_deref(), q)
                        || contains_ignore_case(c.processed_content.as_deref(), q)
                })
            })
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn delete_content(&self, id: &str) -> StoreResult<bool> {
        self.check_delete(Table::EducationalContent).await?;
        let mut tables = self.tables.write().await;
        let before = tables.content.len();
        tables.content.retain(|c| c.id != id);
        Ok(tables.content.len() != before)
    }

    async fn insert_quiz(&self, quiz: NewQuiz) -> StoreResult<QuizRecord> {
        self.check_insert(Table::Quizzes).await?;
        let row = QuizRecord {
            id: new_id(),
            title: quiz.title,
            description: quiz.description,
            topic_id: quiz.topic_id,
            grade: quiz.grade,
            difficulty: quiz.difficulty,
            questions: quiz.questions,
            user_id: quiz.user_id,
            is_ai_generated: quiz.is_ai_generated,
            created_at: Some(Utc::now()),
        };
        self.tables.write().await.quizzes.push(row.clone());
        Ok(row)
    }

    async fn get_quiz(&self, id: &str) -> StoreResult<Option<QuizRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.quizzes.iter().find(|q| q.id == id).cloned())
    }

    async fn list_quizzes(&self, filter: QuizFilter) -> StoreResult<Vec<QuizRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .quizzes
            .iter()
            .rev()
            .filter(|q| {
                filter.topic_ids.as_ref().map_or(true, |ids| {
                    q.topic_id.as_ref().is_some_and(|id| ids.contains(id))
                })
            })
            .filter(|q| {
                filter
                    .difficulty
                    .as_ref()
                    .map_or(true, |d| q.difficulty.as_ref() == Some(d))
            })
            .cloned()
            .collect())
    }

    async fn delete_quiz(&self, id: &str) -> StoreResult<bool> {
        self.check_delete(Table::Quizzes).await?;
        let mut tables = self.tables.write().await;
        let before = tables.quizzes.len();
        tables.quizzes.retain(|q| q.id != id);
        Ok(tables.quizzes.len() != before)
    }

    async fn insert_quiz_result(&self, result: NewQuizResult) -> StoreResult<QuizResultRecord> {
        self.check_insert(Table::QuizResults).await?;
        let row = QuizResultRecord {
            id: new_id(),
            quiz_id: result.quiz_id,
            session_id: result.session_id,
            user_id: result.user_id,
            score: result.score,
            correct_count: result.correct_count,
            total_questions: result.total_questions,
            created_at: Some(Utc::now()),
        };
        self.tables.write().await.quiz_results.push(row.clone());
        Ok(row)
    }

    async fn list_quiz_results(&self, user_id: &str) -> StoreResult<Vec<QuizResultRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .quiz_results
            .iter()
            .rev()
            .filter(|r| r.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn insert_practice_exam(&self, exam: NewPracticeExam) -> StoreResult<PracticeExamRecord> {
        self.check_insert(Table::PracticeExams).await?;
        let row = PracticeExamRecord {
            id: new_id(),
            title: exam.title,
            description: exam.description,
            grade_id: exam.grade_id,
            questions: exam.questions,
            created_at: Some(Utc::now()),
        };
        self.tables.write().await.practice_exams.push(row.clone());
        Ok(row)
    }

    async fn list_quiz_topics(&self) -> StoreResult<Vec<Topic>> {
        let tables = self.tables.read().await;
        let mut topics: Vec<Topic> = tables
            .topics
            .iter()
            .filter(|t| {
                tables
                    .quizzes
                    .iter()
                    .any(|q| q.topic_id.as_deref() == Some(t.id.as_str()))
            })
            .cloned()
            .collect();
        topics.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(topics)
    }

    async fn insert_flashcard_set(&self, set: NewFlashcardSet) -> StoreResult<FlashcardSetRecord> {
        self.check_insert(Table::FlashcardSets).await?;
        let row = FlashcardSetRecord {
            id: new_id(),
            title: set.title,
            description: set.description,
            topic_id: set.topic_id,
            grade: set.grade,
            user_id: set.user_id,
            is_ai_generated: set.is_ai_generated,
            flashcards: set.flashcards,
            created_at: Some(Utc::now()),
        };
        self.tables.write().await.flashcard_sets.push(row.clone());
        Ok(row)
    }

    async fn get_flashcard_set(&self, id: &str) -> StoreResult<Option<FlashcardSetRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.flashcard_sets.iter().find(|s| s.id == id).cloned())
    }

    async fn list_flashcard_sets(
        &self,
        filter: FlashcardFilter,
    ) -> StoreResult<Vec<FlashcardSetRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .flashcard_sets
            .iter()
            .rev()
            .filter(|s| {
                filter
                    .topic_id
                    .as_ref()
                    .map_or(true, |id| s.topic_id.as_ref() == Some(id))
            })
            .filter(|s| filter.grade.map_or(true, |grade| s.grade == Some(grade)))
            .cloned()
            .collect())
    }

    async fn delete_flashcard_set(&self, id: &str) -> StoreResult<bool> {
        self.check_delete(Table::FlashcardSets).await?;
        let mut tables = self.tables.write().await;
        let before = tables.flashcard_sets.len();
        tables.flashcard_sets.retain(|s| s.id != id);
        Ok(tables.flashcard_sets.len() != before)
    }

    async fn insert_flashcard_session(
        &self,
        session: NewFlashcardSession,
    ) -> StoreResult<FlashcardSessionRecord> {
        self.check_insert(Table::FlashcardSessions).await?;
        let row = FlashcardSessionRecord {
            id: new_id(),
            user_id: session.user_id,
            session_id: session.session_id,
            topic_id: session.topic_id,
            flashcard_count: session.flashcard_count,
            created_at: Some(Utc::now()),
        };
        self.tables.write().await.flashcard_sessions.push(row.clone());
        Ok(row)
    }

    async fn list_flashcard_sessions(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<FlashcardSessionRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .flashcard_sessions
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_learning_session(
        &self,
        session: NewLearningSession,
    ) -> StoreResult<LearningSessionRecord> {
        self.check_insert(Table::UserLearningSessions).await?;
        let row = LearningSessionRecord {
            id: new_id(),
            user_id: session.user_id,
            topic_id: session.topic_id,
            grade: session.grade,
            content_id: session.content_id,
            quiz_id: session.quiz_id,
            flashcard_set_id: session.flashcard_set_id,
            created_at: Some(Utc::now()),
        };
        self.tables.write().await.learning_sessions.push(row.clone());
        Ok(row)
    }

    async fn learning_history(&self, user_id: &str) -> StoreResult<Vec<LearningHistoryEntry>> {
        let tables = self.tables.read().await;
        let entries = tables
            .learning_sessions
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id)
            .map(|s| LearningHistoryEntry {
                id: s.id.clone(),
                created_at: s.created_at,
                grade: s.grade,
                topics: title_ref(
                    &s.topic_id,
                    tables
                        .topics
                        .iter()
                        .find(|t| t.id == s.topic_id)
                        .map(|t| t.title.as_str()),
                ),
                educational_content: title_ref(
                    &s.content_id,
                    tables
                        .content
                        .iter()
                        .find(|c| c.id == s.content_id)
                        .map(|c| c.title.as_str()),
                ),
                quizzes: title_ref(
                    &s.quiz_id,
                    tables
                        .quizzes
                        .iter()
                        .find(|q| q.id == s.quiz_id)
                        .map(|q| q.title.as_str()),
                ),
                flashcard_sets: title_ref(
                    &s.flashcard_set_id,
                    tables
                        .flashcard_sets
                        .iter()
                        .find(|f| f.id == s.flashcard_set_id)
                        .map(|f| f.title.as_str()),
                ),
            })
            .collect();
        Ok(entries)
    }

    async fn insert_chat_message(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
    ) -> StoreResult<()> {
        self.check_insert(Table::ChatMessages).await?;
        self.tables.write().await.chat_messages.push(ChatMessage {
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Some(Utc::now()),
        });
        Ok(())
    }

    async fn recent_chat_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<ChatMessage>> {
        let tables = self.tables.read().await;
        let mut recent: Vec<ChatMessage> = tables
            .chat_messages
            .iter()
            .rev()
            .filter(|m| m.session_id == session_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn chat_messages(&self, session_id: &str) -> StoreResult<Vec<ChatMessage>> {
        let tables = self.tables.read().await;
        Ok(tables
            .chat_messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn insert_chat_session(
        &self,
        user_id: &str,
        session_id: &str,
        topic: &str,
    ) -> StoreResult<()> {
        self.check_insert(Table::UserChatSessions).await?;
        self.tables.write().await.chat_sessions.push(ChatSessionRecord {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            topic: Some(topic.to_string()),
            created_at: Some(Utc::now()),
        });
        Ok(())
    }

    async fn list_chat_sessions(&self, user_id: &str) -> StoreResult<Vec<ChatSessionRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .chat_sessions
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn resolve_user(&self, token: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self.tables.read().await.tokens.get(token).cloned())
    }
}
