//! Supabase-backed store.
//!
//! Rows are read and written through the PostgREST interface at
//! `{url}/rest/v1/{table}`; bearer tokens are checked against the GoTrue
//! endpoint at `{url}/auth/v1/user`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    ChatMessage, ChatRole, ChatSessionRecord, ContentFilter, EducationalContent, FlashcardFilter,
    FlashcardSessionRecord, FlashcardSetRecord, Grade, GradeTopic, LearningHistoryEntry,
    LearningSessionRecord, NewEducationalContent, NewFlashcardSession, NewFlashcardSet, NewGrade,
    NewLearningSession, NewPracticeExam, NewQuiz, NewQuizResult, NewTopic, PracticeExamRecord,
    QuizFilter, QuizRecord, QuizResultRecord, Store, StoreError, StoreResult, Table, Topic,
    TopicUpdate, TopicView, UserGrade, UserProfile,
};

/// Default request timeout for store calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const HISTORY_SELECT: &str = "id,created_at,grade,\
    topics(id,title),educational_content(id,title),quizzes(id,title),flashcard_sets(id,title)";

/// Connection settings for a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Public anon key, used for token verification.
    pub anon_key: String,
    /// Service-role key, used for table access when present.
    pub service_key: Option<String>,
}

/// A [`Store`] talking to Supabase over HTTP.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    http: Client,
    base_url: String,
    anon_key: String,
    table_key: String,
}

impl SupabaseStore {
    /// Creates a store for the given project.
    pub fn new(config: SupabaseConfig) -> StoreResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let table_key = config
            .service_key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| config.anon_key.clone());

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key,
            table_key,
        })
    }

    fn request(&self, method: Method, table: Table) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{table}", self.base_url))
            .header("apikey", &self.table_key)
            .bearer_auth(&self.table_key)
    }

    async fn send(request: RequestBuilder) -> StoreResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::api(status.as_u16(), error_message(&body)))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> StoreResult<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: Table,
        columns: &str,
        query: &[(&str, String)],
    ) -> StoreResult<Vec<T>> {
        debug!(table = %table, "Selecting rows");
        let request = self
            .request(Method::GET, table)
            .query(&[("select", columns)])
            .query(query);
        Self::decode(Self::send(request).await?).await
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: Table,
        query: &[(&str, String)],
    ) -> StoreResult<Option<T>> {
        let mut query = query.to_vec();
        query.push(("limit", "1".to_string()));
        Ok(self.select(table, "*", &query).await?.into_iter().next())
    }

    async fn insert<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: Table,
        body: &B,
    ) -> StoreResult<T> {
        debug!(table = %table, "Inserting row");
        let request = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(body);
        let rows: Vec<T> = Self::decode(Self::send(request).await?).await?;
        rows.into_iter()
            .next()
            .ok_or(StoreError::EmptyInsert { table })
    }

    async fn insert_many<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: Table,
        rows: &[B],
    ) -> StoreResult<Vec<T>> {
        debug!(table = %table, count = rows.len(), "Inserting rows");
        let request = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(rows);
        Self::decode(Self::send(request).await?).await
    }

    async fn insert_minimal<B: Serialize + Sync>(&self, table: Table, body: &B) -> StoreResult<()> {
        debug!(table = %table, "Inserting row");
        let request = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(body);
        Self::send(request).await?;
        Ok(())
    }

    async fn update<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: Table,
        query: &[(&str, String)],
        body: &B,
    ) -> StoreResult<Option<T>> {
        debug!(table = %table, "Updating rows");
        let request = self
            .request(Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(query)
            .json(body);
        let rows: Vec<T> = Self::decode(Self::send(request).await?).await?;
        Ok(rows.into_iter().next())
    }

    async fn delete(&self, table: Table, query: &[(&str, String)]) -> StoreResult<bool> {
        debug!(table = %table, "Deleting rows");
        let request = self
            .request(Method::DELETE, table)
            .header("Prefer", "return=representation")
            .query(query);
        let rows: Vec<serde_json::Value> = Self::decode(Self::send(request).await?).await?;
        Ok(!rows.is_empty())
    }

    async fn lookup_profile(&self, table: Table, id: &str) -> StoreResult<Option<ProfileRow>> {
        self.select_one(table, &[("id", eq(id))]).await
    }
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

impl ProfileRow {
    fn into_profile(self, default_role: &str, auth_email: Option<String>) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.or(auth_email),
            name: self.name,
            role: self.role.unwrap_or_else(|| default_role.to_string()),
        }
    }
}

#[derive(Serialize)]
struct GradeTopicRow<'a> {
    grade_id: &'a str,
    topic_id: &'a str,
}

#[derive(Deserialize)]
struct UserGradeRow {
    #[serde(default)]
    grades: Option<Grade>,
}

#[derive(Deserialize)]
struct QuizTopicRow {
    #[serde(default)]
    topic_id: Option<String>,
}

#[derive(Serialize)]
struct ChatMessageRow<'a> {
    session_id: &'a str,
    role: ChatRole,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatSessionRow<'a> {
    user_id: &'a str,
    session_id: &'a str,
    topic: &'a str,
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

fn in_list(values: &[String]) -> String {
    format!("in.({})", values.join(","))
}

fn newest_first() -> (&'static str, String) {
    ("order", "created_at.desc".to_string())
}

/// Keeps only characters that cannot alter a PostgREST filter expression.
fn sanitize_pattern(query: &str) -> String {
    query
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '\''))
        .collect()
}

/// Extracts a readable message from a PostgREST or GoTrue error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(String::from))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl Store for SupabaseStore {
    async fn list_topics(&self) -> StoreResult<Vec<Topic>> {
        self.select(Table::Topics, "*", &[newest_first()]).await
    }

    async fn get_topic(&self, id: &str) -> StoreResult<Option<Topic>> {
        self.select_one(Table::Topics, &[("id", eq(id))]).await
    }

    async fn find_topics_by_title(&self, title: &str, limit: usize) -> StoreResult<Vec<Topic>> {
        self.select(
            Table::Topics,
            "*",
            &[("title", eq(title)), ("limit", limit.to_string())],
        )
        .await
    }

    async fn create_topic(&self, topic: NewTopic) -> StoreResult<Topic> {
        self.insert(Table::Topics, &topic).await
    }

    async fn update_topic(&self, id: &str, update: TopicUpdate) -> StoreResult<Option<Topic>> {
        self.update(Table::Topics, &[("id", eq(id))], &update).await
    }

    async fn delete_topic(&self, id: &str) -> StoreResult<bool> {
        self.delete(Table::GradeTopics, &[("topic_id", eq(id))])
            .await?;
        self.delete(Table::Topics, &[("id", eq(id))]).await
    }

    async fn list_grades(&self) -> StoreResult<Vec<Grade>> {
        self.select(Table::Grades, "*", &[("order", "level.asc".to_string())])
            .await
    }

    async fn get_grade(&self, id: &str) -> StoreResult<Option<Grade>> {
        self.select_one(Table::Grades, &[("id", eq(id))]).await
    }

    async fn grade_by_level(&self, level: u8) -> StoreResult<Option<Grade>> {
        self.select_one(Table::Grades, &[("level", eq(&level.to_string()))])
            .await
    }

    async fn create_grade(&self, grade: NewGrade) -> StoreResult<Grade> {
        self.insert(Table::Grades, &grade).await
    }

    async fn list_grade_topics(&self) -> StoreResult<Vec<GradeTopic>> {
        self.select(Table::GradeTopics, "grade_id,topic_id", &[]).await
    }

    async fn assign_topic_to_grade(&self, grade_id: &str, topic_id: &str) -> StoreResult<()> {
        self.insert_minimal(Table::GradeTopics, &GradeTopicRow { grade_id, topic_id })
            .await
    }

    async fn remove_topic_from_grade(&self, grade_id: &str, topic_id: &str) -> StoreResult<bool> {
        self.delete(
            Table::GradeTopics,
            &[("grade_id", eq(grade_id)), ("topic_id", eq(topic_id))],
        )
        .await
    }

    async fn replace_topic_grades(
        &self,
        topic_id: &str,
        grade_ids: &[String],
    ) -> StoreResult<Vec<GradeTopic>> {
        self.delete(Table::GradeTopics, &[("topic_id", eq(topic_id))])
            .await?;
        let mut rows: Vec<GradeTopicRow<'_>> = Vec::with_capacity(grade_ids.len());
        for grade_id in grade_ids.iter().map(String::as_str) {
            if !rows.iter().any(|r| r.grade_id == grade_id) {
                rows.push(GradeTopicRow { grade_id, topic_id });
            }
        }
        self.insert_many(Table::GradeTopics, &rows).await
    }

    async fn record_topic_view(&self, view: TopicView) -> StoreResult<()> {
        self.insert_minimal(Table::UserTopicHistory, &view).await
    }

    async fn list_user_grades(&self, user_id: &str) -> StoreResult<Vec<Grade>> {
        let rows: Vec<UserGradeRow> = self
            .select(
                Table::UserGrades,
                "grade_id,grades(*)",
                &[("user_id", eq(user_id))],
            )
            .await?;
        let mut grades: Vec<Grade> = rows.into_iter().filter_map(|r| r.grades).collect();
        grades.sort_by_key(|g| g.level);
        Ok(grades)
    }

    async fn assign_user_grade(&self, user_id: &str, grade_id: &str) -> StoreResult<UserGrade> {
        let row = UserGrade {
            user_id: user_id.to_string(),
            grade_id: grade_id.to_string(),
        };
        self.insert(Table::UserGrades, &row).await
    }

    async fn remove_user_grade(&self, user_id: &str, grade_id: &str) -> StoreResult<bool> {
        self.delete(
            Table::UserGrades,
            &[("user_id", eq(user_id)), ("grade_id", eq(grade_id))],
        )
        .await
    }

    async fn insert_content(
        &self,
        content: NewEducationalContent,
    ) -> StoreResult<EducationalContent> {
        self.insert(Table::EducationalContent, &content).await
    }

    async fn get_content(&self, id: &str) -> StoreResult<Option<EducationalContent>> {
        self.select_one(Table::EducationalContent, &[("id", eq(id))])
            .await
    }

    async fn list_content(&self, filter: ContentFilter) -> StoreResult<Vec<EducationalContent>> {
        let mut query = vec![newest_first()];
        if let Some(ids) = &filter.topic_ids {
            query.push(("topic_id", in_list(ids)));
        }
        if let Some(grade) = filter.grade {
            query.push(("grade", eq(&grade.to_string())));
        }
        if let Some(q) = &filter.query {
            let pattern = sanitize_pattern(q);
            query.push((
                "or",
                format!(
                    "(title.ilike.*{pattern}*,description.ilike.*{pattern}*,processed_content.ilike.*{pattern}*)"
                ),
            ));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }
        self.select(Table::EducationalContent, "*", &query).await
    }

    async fn delete_content(&self, id: &str) -> StoreResult<bool> {
        self.delete(Table::EducationalContent, &[("id", eq(id))])
            .await
    }

    async fn insert_quiz(&self, quiz: NewQuiz) -> StoreResult<QuizRecord> {
        self.insert(Table::Quizzes, &quiz).await
    }

    async fn get_quiz(&self, id: &str) -> StoreResult<Option<QuizRecord>> {
        self.select_one(Table::Quizzes, &[("id", eq(id))]).await
    }

    async fn list_quizzes(&self, filter: QuizFilter) -> StoreResult<Vec<QuizRecord>> {
        let mut query = vec![newest_first()];
        if let Some(ids) = &filter.topic_ids {
            query.push(("topic_id", in_list(ids)));
        }
        if let Some(difficulty) = &filter.difficulty {
            query.push(("difficulty", eq(difficulty)));
        }
        self.select(Table::Quizzes, "*", &query).await
    }

    async fn delete_quiz(&self, id: &str) -> StoreResult<bool> {
        self.delete(Table::Quizzes, &[("id", eq(id))]).await
    }

    async fn insert_quiz_result(&self, result: NewQuizResult) -> StoreResult<QuizResultRecord> {
        self.insert(Table::QuizResults, &result).await
    }

    async fn list_quiz_results(&self, user_id: &str) -> StoreResult<Vec<QuizResultRecord>> {
        self.select(
            Table::QuizResults,
            "*",
            &[("user_id", eq(user_id)), newest_first()],
        )
        .await
    }

    async fn insert_practice_exam(&self, exam: NewPracticeExam) -> StoreResult<PracticeExamRecord> {
        self.insert(Table::PracticeExams, &exam).await
    }

    async fn list_quiz_topics(&self) -> StoreResult<Vec<Topic>> {
        let rows: Vec<QuizTopicRow> = self
            .select(
                Table::Quizzes,
                "topic_id",
                &[("topic_id", "not.is.null".to_string())],
            )
            .await?;
        let mut ids: Vec<String> = rows.into_iter().filter_map(|r| r.topic_id).collect();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            Table::Topics,
            "*",
            &[("id", in_list(&ids)), ("order", "title.asc".to_string())],
        )
        .await
    }

    async fn insert_flashcard_set(&self, set: NewFlashcardSet) -> StoreResult<FlashcardSetRecord> {
        self.insert(Table::FlashcardSets, &set).await
    }

    async fn get_flashcard_set(&self, id: &str) -> StoreResult<Option<FlashcardSetRecord>> {
        self.select_one(Table::FlashcardSets, &[("id", eq(id))]).await
    }

    async fn list_flashcard_sets(
        &self,
        filter: FlashcardFilter,
    ) -> StoreResult<Vec<FlashcardSetRecord>> {
        let mut query = vec![newest_first()];
        if let Some(topic_id) = &filter.topic_id {
            query.push(("topic_id", eq(topic_id)));
        }
        if let Some(grade) = filter.grade {
            query.push(("grade", eq(&grade.to_string())));
        }
        self.select(Table::FlashcardSets, "*", &query).await
    }

    async fn delete_flashcard_set(&self, id: &str) -> StoreResult<bool> {
        self.delete(Table::FlashcardSets, &[("id", eq(id))]).await
    }

    async fn insert_flashcard_session(
        &self,
        session: NewFlashcardSession,
    ) -> StoreResult<FlashcardSessionRecord> {
        self.insert(Table::FlashcardSessions, &session).await
    }

    async fn list_flashcard_sessions(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<FlashcardSessionRecord>> {
        self.select(
            Table::FlashcardSessions,
            "*",
            &[("user_id", eq(user_id)), newest_first()],
        )
        .await
    }

    async fn insert_learning_session(
        &self,
        session: NewLearningSession,
    ) -> StoreResult<LearningSessionRecord> {
        self.insert(Table::UserLearningSessions, &session).await
    }

    async fn learning_history(&self, user_id: &str) -> StoreResult<Vec<LearningHistoryEntry>> {
        self.select(
            Table::UserLearningSessions,
            HISTORY_SELECT,
            &[("user_id", eq(user_id)), newest_first()],
        )
        .await
    }

    async fn insert_chat_message(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
    ) -> StoreResult<()> {
        self.insert_minimal(
            Table::ChatMessages,
            &ChatMessageRow {
                session_id,
                role,
                content,
            },
        )
        .await
    }

    async fn recent_chat_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = self
            .select(
                Table::ChatMessages,
                "session_id,role,content,created_at",
                &[
                    ("session_id", eq(session_id)),
                    newest_first(),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        messages.reverse();
        Ok(messages)
    }

    async fn chat_messages(&self, session_id: &str) -> StoreResult<Vec<ChatMessage>> {
        self.select(
            Table::ChatMessages,
            "session_id,role,content,created_at",
            &[
                ("session_id", eq(session_id)),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn insert_chat_session(
        &self,
        user_id: &str,
        session_id: &str,
        topic: &str,
    ) -> StoreResult<()> {
        self.insert_minimal(
            Table::UserChatSessions,
            &ChatSessionRow {
                user_id,
                session_id,
                topic,
            },
        )
        .await
    }

    async fn list_chat_sessions(&self, user_id: &str) -> StoreResult<Vec<ChatSessionRecord>> {
        self.select(
            Table::UserChatSessions,
            "*",
            &[("user_id", eq(user_id)), newest_first()],
        )
        .await
    }

    async fn resolve_user(&self, token: &str) -> StoreResult<Option<UserProfile>> {
        let request = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token);

        let response = match Self::send(request).await {
            Ok(response) => response,
            Err(StoreError::Api { status, message })
                if status == StatusCode::UNAUTHORIZED.as_u16()
                    || status == StatusCode::FORBIDDEN.as_u16() =>
            {
                warn!(status, message = %message, "Token rejected by auth service");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let auth_user: AuthUser = Self::decode(response).await?;

        if let Some(admin) = self.lookup_profile(Table::Admins, &auth_user.id).await? {
            return Ok(Some(admin.into_profile("admin", auth_user.email)));
        }
        if let Some(user) = self.lookup_profile(Table::Users, &auth_user.id).await? {
            return Ok(Some(user.into_profile("user", auth_user.email)));
        }

        warn!(user_id = %auth_user.id, "Authenticated user has no profile row");
        Ok(None)
    }
}
