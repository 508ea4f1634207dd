//! `/api/admin` endpoints. Every handler requires the admin role.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use heritagepal_store::{ContentFilter, EducationalContent, NewQuiz, QuizRecord};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{count_from_value, ApiError, AppState};
use crate::auth::AdminUser;
use crate::learning::{parse_quiz_questions, Parsed};
use crate::prompt::{self, Difficulty, DEFAULT_QUIZ_QUESTIONS};
use crate::HeritageError;

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/content", get(handle_list_content))
        .route(
            "/content/:id",
            get(handle_get_content).delete(handle_delete_content),
        )
        .route("/content/:id/generate-quiz", post(handle_generate_quiz))
}

/// Handler for `GET /api/admin/content`: all content, newest first.
async fn handle_list_content(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<EducationalContent>>, ApiError> {
    Ok(Json(
        state.store.list_content(ContentFilter::default()).await?,
    ))
}

/// Handler for `GET /api/admin/content/:id`.
async fn handle_get_content(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> Result<Json<EducationalContent>, ApiError> {
    Ok(Json(existing_content(&state, &id).await?))
}

/// Handler for `DELETE /api/admin/content/:id`.
async fn handle_delete_content(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.store.delete_content(&id).await? {
        return Err(ApiError::not_found("Content not found"));
    }
    info!(content_id = %id, admin_id = %admin.id, "Deleted content");
    Ok(Json(json!({ "message": "Content deleted successfully" })))
}

/// Handler for `POST /api/admin/content/:id/generate-quiz`.
///
/// Builds a quiz from one content row's processed text. A failed service
/// call is an error; unusable output is replaced by the fallback quiz.
async fn handle_generate_quiz(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    body: Option<Json<Value>>,
) -> Result<(StatusCode, Json<QuizRecord>), ApiError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let content = existing_content(&state, &id).await?;

    let difficulty = body
        .get("difficulty")
        .and_then(Value::as_str)
        .and_then(Difficulty::from_str_case_insensitive)
        .unwrap_or_default();
    let question_count =
        count_from_value(body.get("questionCount")).unwrap_or(DEFAULT_QUIZ_QUESTIONS);

    let raw = state
        .learning_sets()
        .text(&prompt::content_quiz_prompt(
            &content.title,
            content.grade,
            content.processed_content.as_deref().unwrap_or_default(),
            difficulty,
            question_count,
        ))
        .await?;
    let questions = match parse_quiz_questions(&raw) {
        Parsed::Generated(questions) => questions,
        Parsed::Fallback { value, reason } => {
            warn!(content_id = %id, reason = %reason, "Unusable quiz output, using fallback");
            value
        }
    };

    let grade_label = content
        .grade
        .map_or_else(|| "unknown".to_string(), |g| g.to_string());
    let quiz = state
        .store
        .insert_quiz(NewQuiz {
            title: format!("{} Quiz", content.title),
            description: Some(format!(
                "Quiz generated from {} for grade {grade_label}",
                content.title
            )),
            topic_id: content.topic_id.clone(),
            grade: content.grade,
            difficulty: Some(difficulty.as_str().to_string()),
            questions: serde_json::to_string(&questions).map_err(HeritageError::from)?,
            user_id: Some(admin.id.clone()),
            is_ai_generated: true,
        })
        .await?;
    info!(
        quiz_id = %quiz.id,
        content_id = %id,
        admin_id = %admin.id,
        "Generated quiz from content"
    );

    Ok((StatusCode::CREATED, Json(quiz)))
}

async fn existing_content(state: &AppState, id: &str) -> Result<EducationalContent, ApiError> {
    state
        .store
        .get_content(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Content not found"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};
    use heritagepal_genai::{LlmErrorKind, ScriptedGenerator};
    use heritagepal_store::{MemoryStore, NewEducationalContent, Store, Table};
    use serde_json::json;

    use super::super::tests::{router, seeded_store, send, topic_id, ADMIN_TOKEN, STUDENT_TOKEN};

    const QUIZ_JSON: &str = r#"[
        {"question_text": "What is bauxite used to make?",
         "options": ["Aluminium", "Sugar", "Rice", "Timber"], "correct_answer": 0,
         "explanation": "Bauxite is the main ore of aluminium."}
    ]"#;

    async fn add_content(store: &MemoryStore) -> String {
        let topic = topic_id(store, "Natural Resources").await;
        store
            .insert_content(NewEducationalContent {
                title: "Bauxite Mining".to_string(),
                description: Some("Mining in Linden".to_string()),
                topic_id: Some(topic),
                grade: Some(5),
                source: Some("Ministry of Education".to_string()),
                raw_content: None,
                processed_content: Some("Bauxite is mined in Linden.".to_string()),
                user_id: None,
                is_ai_generated: false,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_admin_routes_reject_students() {
        let store = seeded_store().await;
        let generator = Arc::new(ScriptedGenerator::new(""));
        let (status, body) = send(
            router(store.clone(), generator.clone()),
            Method::GET,
            "/api/admin/content",
            Some(STUDENT_TOKEN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Not authorized as an admin");

        let (status, _) =
            send(router(store, generator), Method::GET, "/api/admin/content", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_get_and_delete_content() {
        let store = seeded_store().await;
        let id = add_content(&store).await;
        let generator = Arc::new(ScriptedGenerator::new(""));

        let (status, body) = send(
            router(store.clone(), generator.clone()),
            Method::GET,
            "/api/admin/content",
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let uri = format!("/api/admin/content/{id}");
        let (status, body) = send(
            router(store.clone(), generator.clone()),
            Method::GET,
            &uri,
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Bauxite Mining");

        let (status, body) = send(
            router(store.clone(), generator.clone()),
            Method::DELETE,
            &uri,
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Content deleted successfully");
        assert_eq!(store.row_count(Table::EducationalContent).await, 0);

        let (status, body) =
            send(router(store, generator), Method::GET, &uri, Some(ADMIN_TOKEN), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Content not found");
    }

    #[tokio::test]
    async fn test_generate_quiz_from_content() {
        let store = seeded_store().await;
        let id = add_content(&store).await;
        let generator = Arc::new(ScriptedGenerator::new(QUIZ_JSON));

        let (status, body) = send(
            router(store.clone(), generator.clone()),
            Method::POST,
            &format!("/api/admin/content/{id}/generate-quiz"),
            Some(ADMIN_TOKEN),
            Some(json!({"difficulty": "Easy", "questionCount": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["title"], "Bauxite Mining Quiz");
        assert_eq!(body["description"], "Quiz generated from Bauxite Mining for grade 5");
        assert_eq!(body["difficulty"], "easy");
        assert_eq!(body["grade"], 5);

        let prompt = &generator.prompts().await[0];
        assert!(prompt.contains("Title: Bauxite Mining"));
        assert!(prompt.contains("Bauxite is mined in Linden."));
        assert!(prompt.contains("3 multiple-choice questions"));

        let stored = store
            .get_quiz(body["id"].as_str().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(stored.questions.contains("aluminium"));
    }

    #[tokio::test]
    async fn test_generate_quiz_failures() {
        let store = seeded_store().await;
        let id = add_content(&store).await;

        let (status, body) = send(
            router(store.clone(), Arc::new(ScriptedGenerator::new(QUIZ_JSON))),
            Method::POST,
            "/api/admin/content/missing/generate-quiz",
            Some(ADMIN_TOKEN),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Content not found");

        let (status, _) = send(
            router(
                store.clone(),
                Arc::new(ScriptedGenerator::failing(LlmErrorKind::Authentication)),
            ),
            Method::POST,
            &format!("/api/admin/content/{id}/generate-quiz"),
            Some(ADMIN_TOKEN),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.row_count(Table::Quizzes).await, 0);
    }
}
