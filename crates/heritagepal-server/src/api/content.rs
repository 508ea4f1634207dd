//! `/api/content` endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use heritagepal_store::{ContentFilter, EducationalContent, Topic};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{
    grade_for_level, grade_from_str, grade_from_value, is_assigned, non_empty, require_grade_str,
    topic_ids_for_grade, ApiError, AppState,
};
use crate::learning::{GeneratedContent, GeneratedFlashcardSet, GeneratedQuiz};
use crate::prompt::{self, truncate_chars};

/// Content rows used as context for an on-demand summary.
const SUMMARY_CONTEXT_ROWS: usize = 5;
/// Characters of each content row included in summary context.
const SUMMARY_CONTEXT_CHARS: usize = 2000;

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/topics", get(handle_topics))
        .route("/topic/:topic", get(handle_topic_content))
        .route("/grade/:grade", get(handle_content_by_grade))
        .route("/summary", post(handle_summary))
        .route("/search", get(handle_search))
        .route("/generate", get(handle_generate))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A topic with the grades it is taught in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct TopicWithGrades {
    id: String,
    title: String,
    description: Option<String>,
    /// Lowest assigned grade.
    grade_level: Option<u8>,
    all_grades: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct GradeQuery {
    grade: Option<String>,
}

#[derive(Debug, Serialize)]
struct TopicContentResponse {
    topic: Topic,
    content: Vec<EducationalContent>,
}

/// A content row with its topic's title.
#[derive(Debug, Serialize)]
struct ContentWithTopic {
    #[serde(flatten)]
    content: EducationalContent,
    topic_title: String,
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    topic: String,
    topic_id: String,
    grade: u8,
    summary: String,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    query: Option<String>,
    grade: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateQuery {
    topic_id: Option<String>,
    grade: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    topic: String,
    grade: u8,
    timestamp: String,
    educational_content: GeneratedContent,
    quiz: GeneratedQuiz,
    flashcard_set: GeneratedFlashcardSet,
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/content/topics`.
///
/// Store failures degrade to an empty list.
async fn handle_topics(State(state): State<Arc<AppState>>) -> Json<Vec<TopicWithGrades>> {
    match topics_with_grades(&state).await {
        Ok(topics) => Json(topics),
        Err(e) => {
            warn!(error = ?e, "Failed to list topics, returning empty list");
            Json(Vec::new())
        }
    }
}

async fn topics_with_grades(state: &AppState) -> Result<Vec<TopicWithGrades>, ApiError> {
    let mut topics = state.store.list_topics().await?;
    topics.sort_by(|a, b| a.title.cmp(&b.title));

    let levels: HashMap<String, u8> = state
        .store
        .list_grades()
        .await?
        .into_iter()
        .map(|g| (g.id, g.level))
        .collect();

    let mut by_topic: HashMap<String, Vec<u8>> = HashMap::new();
    match state.store.list_grade_topics().await {
        Ok(assignments) => {
            for assignment in assignments {
                if let Some(level) = levels.get(&assignment.grade_id) {
                    by_topic
                        .entry(assignment.topic_id)
                        .or_default()
                        .push(*level);
                }
            }
        }
        Err(e) => warn!(error = %e, "Failed to load grade assignments"),
    }

    Ok(topics
        .into_iter()
        .map(|topic| {
            let mut all_grades = by_topic.remove(&topic.id).unwrap_or_default();
            all_grades.sort_unstable();
            TopicWithGrades {
                grade_level: all_grades.first().copied(),
                id: topic.id,
                title: topic.title,
                description: topic.description,
                all_grades,
            }
        })
        .collect())
}

/// Handler for `GET /api/content/topic/:topic`.
async fn handle_topic_content(
    State(state): State<Arc<AppState>>,
    Path(topic_id): Path<String>,
    Query(query): Query<GradeQuery>,
) -> Result<Json<TopicContentResponse>, ApiError> {
    let topic = state
        .store
        .get_topic(&topic_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Topic not found"))?;

    if let Some(raw) = query.grade.as_deref().filter(|g| !g.trim().is_empty()) {
        let level =
            grade_from_str(Some(raw)).ok_or_else(|| ApiError::not_found("Grade not found"))?;
        let grade = grade_for_level(&state, level).await?;
        if !is_assigned(&state, &grade.id, &topic.id).await? {
            return Err(ApiError::not_found(
                "This topic is not available for the specified grade",
            ));
        }
    }

    let content = state
        .store
        .list_content(ContentFilter {
            topic_ids: Some(vec![topic.id.clone()]),
            ..ContentFilter::default()
        })
        .await?;

    Ok(Json(TopicContentResponse { topic, content }))
}

/// Handler for `GET /api/content/grade/:grade`.
async fn handle_content_by_grade(
    State(state): State<Arc<AppState>>,
    Path(grade): Path<String>,
) -> Result<Json<Vec<ContentWithTopic>>, ApiError> {
    let level = grade_from_str(Some(&grade)).ok_or_else(|| ApiError::not_found("Grade not found"))?;
    let grade = grade_for_level(&state, level).await?;

    let topic_ids = topic_ids_for_grade(&state, &grade.id).await?;
    if topic_ids.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let content = state
        .store
        .list_content(ContentFilter {
            topic_ids: Some(topic_ids),
            ..ContentFilter::default()
        })
        .await?;

    Ok(Json(with_topic_titles(&state, content).await))
}

/// Handler for `POST /api/content/summary`.
async fn handle_summary(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let (Some(topic_id), Some(raw_grade)) = (non_empty(body.get("topic")), body.get("grade"))
    else {
        return Err(ApiError::bad_request("Topic and grade are required"));
    };
    let level =
        grade_from_value(Some(raw_grade)).ok_or_else(|| ApiError::not_found("Grade not found"))?;

    let grade = grade_for_level(&state, level).await?;
    let topic = state
        .store
        .get_topic(topic_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Topic not found"))?;
    if !is_assigned(&state, &grade.id, &topic.id).await? {
        return Err(ApiError::not_found(
            "This topic is not available for the specified grade",
        ));
    }

    let rows = state
        .store
        .list_content(ContentFilter {
            topic_ids: Some(vec![topic.id.clone()]),
            limit: Some(SUMMARY_CONTEXT_ROWS),
            ..ContentFilter::default()
        })
        .await?;
    if rows.is_empty() {
        return Err(ApiError::not_found(
            "No content found for this topic and grade",
        ));
    }

    let context: String = rows
        .iter()
        .map(|row| {
            let text = row.processed_content.as_deref().unwrap_or_default();
            format!("{}: {}\n\n", row.title, truncate_chars(text, SUMMARY_CONTEXT_CHARS))
        })
        .collect();

    info!(topic_id = %topic.id, grade = level, rows = rows.len(), "Generating topic summary");
    let summary = state
        .learning_sets()
        .text(&prompt::context_summary_prompt(&topic.title, level, &context))
        .await?;

    Ok(Json(SummaryResponse {
        topic: topic.title,
        topic_id: topic.id,
        grade: level,
        summary,
    }))
}

/// Handler for `GET /api/content/search`.
async fn handle_search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ContentWithTopic>>, ApiError> {
    let Some(text) = query.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
        return Err(ApiError::bad_request("Search query is required"));
    };

    let mut filter = ContentFilter {
        query: Some(text.to_string()),
        ..ContentFilter::default()
    };

    if let Some(raw) = query.grade.as_deref().filter(|g| !g.trim().is_empty()) {
        let level =
            grade_from_str(Some(raw)).ok_or_else(|| ApiError::not_found("Grade not found"))?;
        let grade = grade_for_level(&state, level).await?;
        let topic_ids = topic_ids_for_grade(&state, &grade.id).await?;
        if !topic_ids.is_empty() {
            filter.topic_ids = Some(topic_ids);
        }
    }

    let content = state.store.list_content(filter).await?;
    info!(query = %text, results = content.len(), "Content search");
    Ok(Json(with_topic_titles(&state, content).await))
}

/// Handler for `GET /api/content/generate`.
///
/// Generates a learning set without saving it. Input is validated before any
/// store or generation call.
async fn handle_generate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GenerateQuery>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Some(topic_id) = query.topic_id.as_deref().map(str::trim).filter(|t| !t.is_empty())
    else {
        return Err(ApiError::bad_request("Topic ID is required"));
    };
    let grade = require_grade_str(query.grade.as_deref())?;

    let topic = state
        .store
        .get_topic(topic_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Topic not found"))?;

    let set = state.learning_sets().generate(&topic, grade).await?;

    Ok(Json(GenerateResponse {
        topic: topic.title,
        grade,
        timestamp: Utc::now().to_rfc3339(),
        educational_content: set.educational_content,
        quiz: set.quiz,
        flashcard_set: set.flashcard_set,
    }))
}

/// Attaches topic titles to content rows; unknown topics read "Unknown Topic".
async fn with_topic_titles(
    state: &AppState,
    content: Vec<EducationalContent>,
) -> Vec<ContentWithTopic> {
    let titles: HashMap<String, String> = match state.store.list_topics().await {
        Ok(topics) => topics.into_iter().map(|t| (t.id, t.title)).collect(),
        Err(e) => {
            warn!(error = %e, "Failed to load topic titles");
            HashMap::new()
        }
    };

    content
        .into_iter()
        .map(|content| {
            let topic_title = content
                .topic_id
                .as_ref()
                .and_then(|id| titles.get(id))
                .cloned()
                .unwrap_or_else(|| "Unknown Topic".to_string());
            ContentWithTopic {
                content,
                topic_title,
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::http::{Method, StatusCode};
    use heritagepal_genai::{GeminiClient, ScriptedGenerator, DEFAULT_MODEL};
    use heritagepal_store::{NewEducationalContent, Store};
    use serde_json::json;

    use super::super::tests::{router, seeded_store, send, topic_id};

    const QUIZ_JSON: &str = r#"[{"question_text": "Which festival is celebrated on Republic Day?",
        "options": ["Mashramani", "Diwali", "Phagwah", "Eid"], "correct_answer": 0,
        "topic": "Guyanese Culture", "difficulty": "medium"}]"#;

    async fn add_content(store: &heritagepal_store::MemoryStore, topic_id: &str, title: &str) {
        store
            .insert_content(NewEducationalContent {
                title: title.to_string(),
                description: Some("Notes".to_string()),
                topic_id: Some(topic_id.to_string()),
                grade: Some(3),
                source: Some("Teacher".to_string()),
                raw_content: None,
                processed_content: Some(format!("{title} processed text")),
                user_id: None,
                is_ai_generated: false,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_topics_include_grade_levels() {
        let store = seeded_store().await;
        let generator = std::sync::Arc::new(ScriptedGenerator::new(""));
        let (status, body) =
            send(router(store, generator), Method::GET, "/api/content/topics", None, None).await;

        assert_eq!(status, StatusCode::OK);
        let topics = body.as_array().unwrap();
        assert_eq!(topics.len(), 10);
        let titles: Vec<&str> = topics.iter().map(|t| t["title"].as_str().unwrap()).collect();
        let mut sorted = titles.clone();
        sorted.sort_unstable();
        assert_eq!(titles, sorted);

        let community = topics.iter().find(|t| t["title"] == "Our Community").unwrap();
        assert_eq!(community["gradeLevel"], 1);
        assert_eq!(community["allGrades"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_generate_rejects_out_of_range_grades_without_calls() {
        let store = seeded_store().await;
        let topic = topic_id(&store, "Guyanese Culture").await;

        for grade in ["0", "7", "-1", "abc", ""] {
            let generator = std::sync::Arc::new(ScriptedGenerator::new(""));
            let uri = format!("/api/content/generate?topic_id={topic}&grade={grade}");
            let (status, body) =
                send(router(store.clone(), generator.clone()), Method::GET, &uri, None, None).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "grade {grade:?}");
            assert!(body["error"].as_str().unwrap().contains("grade"));
            assert_eq!(generator.call_count().await, 0);
        }
    }

    #[tokio::test]
    async fn test_generate_requires_topic_id() {
        let store = seeded_store().await;
        let generator = std::sync::Arc::new(ScriptedGenerator::new(""));
        let (status, body) = send(
            router(store, generator),
            Method::GET,
            "/api/content/generate?grade=3",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Topic ID is required");
    }

    #[tokio::test]
    async fn test_generate_unknown_topic_is_404() {
        let store = seeded_store().await;
        let generator = std::sync::Arc::new(ScriptedGenerator::new(""));
        let (status, body) = send(
            router(store, generator.clone()),
            Method::GET,
            "/api/content/generate?topic_id=missing&grade=3",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Topic not found");
        assert_eq!(generator.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_generate_returns_learning_set_without_saving() {
        let store = seeded_store().await;
        let topic = topic_id(&store, "Guyanese Culture").await;
        let generator = std::sync::Arc::new(
            ScriptedGenerator::new("Guyana celebrates many festivals.")
                .respond_to("multiple-choice questions", QUIZ_JSON)
                .respond_to("flashcards about", "not json"),
        );

        let uri = format!("/api/content/generate?topic_id={topic}&grade=3");
        let (status, body) =
            send(router(store.clone(), generator.clone()), Method::GET, &uri, None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["topic"], "Guyanese Culture");
        assert_eq!(body["grade"], 3);
        assert_eq!(body["educational_content"]["source"], "AI-Generated");
        assert_eq!(body["quiz"]["questions"].as_array().unwrap().len(), 1);
        assert_eq!(
            body["flashcard_set"]["flashcards"][0]["term"],
            "What is the capital of Guyana?"
        );
        assert_eq!(generator.call_count().await, 3);
        assert_eq!(
            store
                .row_count(heritagepal_store::Table::EducationalContent)
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_generation_failure_hides_service_detail() {
        let store = seeded_store().await;
        let topic = topic_id(&store, "Guyanese Culture").await;
        let client = GeminiClient::new("TOP-SECRET-GEMINI-KEY", DEFAULT_MODEL)
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        let router = crate::create_router(crate::AppState::new(
            crate::Config::default(),
            store,
            std::sync::Arc::new(client),
        ));

        let uri = format!("/api/content/generate?topic_id={topic}&grade=3");
        let (status, body) = send(router, Method::GET, &uri, None, None).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to generate learning content");
        assert!(!body.to_string().contains("TOP-SECRET-GEMINI-KEY"));
    }

    #[tokio::test]
    async fn test_topic_content_checks_grade_assignment() {
        let store = seeded_store().await;
        let topic = topic_id(&store, "My Family").await;
        add_content(&store, &topic, "Family Notes").await;
        let generator = std::sync::Arc::new(ScriptedGenerator::new(""));

        let uri = format!("/api/content/topic/{topic}?grade=1");
        let (status, body) =
            send(router(store.clone(), generator.clone()), Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["topic"]["title"], "My Family");
        assert_eq!(body["content"][0]["title"], "Family Notes");

        let uri = format!("/api/content/topic/{topic}?grade=6");
        let (status, body) =
            send(router(store.clone(), generator.clone()), Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body["error"],
            "This topic is not available for the specified grade"
        );

        let (status, _) = send(
            router(store, generator),
            Method::GET,
            "/api/content/topic/missing",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_content_by_grade_adds_topic_titles() {
        let store = seeded_store().await;
        let topic = topic_id(&store, "Guyanese Culture").await;
        add_content(&store, &topic, "Festivals").await;
        let generator = std::sync::Arc::new(ScriptedGenerator::new(""));

        let (status, body) = send(
            router(store.clone(), generator.clone()),
            Method::GET,
            "/api/content/grade/3",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["title"], "Festivals");
        assert_eq!(body[0]["topic_title"], "Guyanese Culture");

        let (status, body) = send(
            router(store, generator),
            Method::GET,
            "/api/content/grade/9",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Grade not found");
    }

    #[tokio::test]
    async fn test_summary_uses_stored_content() {
        let store = seeded_store().await;
        let topic = topic_id(&store, "Guyanese Culture").await;
        add_content(&store, &topic, "Festivals").await;
        let generator = std::sync::Arc::new(ScriptedGenerator::new("A short summary."));

        let (status, body) = send(
            router(store.clone(), generator.clone()),
            Method::POST,
            "/api/content/summary",
            None,
            Some(json!({"topic": topic, "grade": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"], "A short summary.");
        assert_eq!(body["topic"], "Guyanese Culture");
        assert_eq!(body["grade"], 3);

        let prompts = generator.prompts().await;
        assert!(prompts[0].contains("Festivals: Festivals processed text"));
    }

    #[tokio::test]
    async fn test_summary_validation() {
        let store = seeded_store().await;
        let topic = topic_id(&store, "Guyanese Culture").await;
        let generator = std::sync::Arc::new(ScriptedGenerator::new(""));

        let (status, body) = send(
            router(store.clone(), generator.clone()),
            Method::POST,
            "/api/content/summary",
            None,
            Some(json!({"topic": topic})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Topic and grade are required");

        let (status, body) = send(
            router(store, generator),
            Method::POST,
            "/api/content/summary",
            None,
            Some(json!({"topic": topic, "grade": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No content found for this topic and grade");
    }

    #[tokio::test]
    async fn test_search() {
        let store = seeded_store().await;
        let culture = topic_id(&store, "Guyanese Culture").await;
        let family = topic_id(&store, "My Family").await;
        add_content(&store, &culture, "Mashramani Festival").await;
        add_content(&store, &family, "Family Festival").await;
        let generator = std::sync::Arc::new(ScriptedGenerator::new(""));

        let (status, body) = send(
            router(store.clone(), generator.clone()),
            Method::GET,
            "/api/content/search?query=festival",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = send(
            router(store.clone(), generator.clone()),
            Method::GET,
            "/api/content/search?query=festival&grade=4",
            None,
            None,
        )
        .await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["topic_title"], "Guyanese Culture");

        let (status, body) = send(
            router(store, generator),
            Method::GET,
            "/api/content/search",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Search query is required");
    }
}
