//! `/api/users` endpoints. All require a bearer token.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use heritagepal_store::{Grade, LearningHistoryEntry, UserProfile};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{non_empty, require_grade, ApiError, AppState};
use crate::auth::{AuthUser, BearerToken};

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", get(handle_profile))
        .route("/learning-session", post(handle_learning_session))
        .route("/learning-history", get(handle_learning_history))
        .route("/learning-sessions", get(handle_learning_history))
        .route(
            "/:id/grades",
            get(handle_user_grades).post(handle_assign_user_grade),
        )
        .route("/:id/grades/:grade_id", delete(handle_remove_user_grade))
}

/// Ids of a persisted learning session.
#[derive(Debug, Serialize)]
struct LearningSessionCreated {
    session_id: String,
    content_id: String,
    quiz_id: String,
    flashcard_set_id: String,
    topic: String,
    grade: u8,
}

/// Handler for `GET /api/users/profile`.
async fn handle_profile(AuthUser(user): AuthUser) -> Json<UserProfile> {
    Json(user)
}

/// Handler for `POST /api/users/learning-session`.
///
/// The body is validated before the token is resolved, so invalid input
/// never reaches the store or the generation service.
async fn handle_learning_session(
    State(state): State<Arc<AppState>>,
    token: BearerToken,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<LearningSessionCreated>), ApiError> {
    let Some(topic_id) = non_empty(body.get("topic_id")) else {
        return Err(ApiError::bad_request("Topic ID is required"));
    };
    let grade = require_grade(body.get("grade"))?;

    let user = token.resolve(&state).await?;
    let topic = state
        .store
        .get_topic(topic_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Topic not found"))?;

    info!(user_id = %user.id, topic_id = %topic.id, grade, "Creating learning session");
    let set = state.learning_sets().generate(&topic, grade).await?;
    let saved = state
        .persistence()
        .save(&set, &user.id, &topic.id, grade)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LearningSessionCreated {
            session_id: saved.session_id,
            content_id: saved.content_id,
            quiz_id: saved.quiz_id,
            flashcard_set_id: saved.flashcard_set_id,
            topic: topic.title,
            grade,
        }),
    ))
}

/// Handler for `GET /api/users/learning-history`: the caller's sessions, newest first.
async fn handle_learning_history(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<LearningHistoryEntry>>, ApiError> {
    Ok(Json(state.store.learning_history(&user.id).await?))
}

// ============================================================================
// Chosen grades
// ============================================================================

/// Only the user themselves or an admin may read or change a user's grades.
fn require_self_or_admin(caller: &UserProfile, user_id: &str) -> Result<(), ApiError> {
    if caller.id == user_id || caller.is_admin() {
        return Ok(());
    }
    warn!(caller_id = %caller.id, user_id, "Refused access to another user's grades");
    Err(ApiError::Forbidden("Not authorized to manage grades for this user".to_string()))
}

/// Handler for `GET /api/users/:id/grades`: the user's chosen grades by level.
async fn handle_user_grades(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Grade>>, ApiError> {
    require_self_or_admin(&caller, &user_id)?;
    Ok(Json(state.store.list_user_grades(&user_id).await?))
}

/// Handler for `POST /api/users/:id/grades`.
///
/// Choosing a grade twice is not an error; the second call answers 200.
async fn handle_assign_user_grade(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(user_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Some(grade_id) = non_empty(body.get("grade_id")) else {
        return Err(ApiError::bad_request("Invalid data: Grade ID is required"));
    };
    require_self_or_admin(&caller, &user_id)?;

    if state.store.get_grade(grade_id).await?.is_none() {
        return Err(ApiError::not_found("Grade not found"));
    }
    let chosen = state.store.list_user_grades(&user_id).await?;
    if chosen.iter().any(|g| g.id == grade_id) {
        return Ok((
            StatusCode::OK,
            Json(json!({ "message": "User is already assigned to this grade" })),
        ));
    }

    let assignment = state.store.assign_user_grade(&user_id, grade_id).await?;
    info!(user_id = %user_id, grade_id, "Assigned grade to user");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Grade assigned successfully",
            "assignment": assignment,
        })),
    ))
}

/// Handler for `DELETE /api/users/:id/grades/:grade_id`.
async fn handle_remove_user_grade(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path((user_id, grade_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    require_self_or_admin(&caller, &user_id)?;
    if !state.store.remove_user_grade(&user_id, &grade_id).await? {
        return Err(ApiError::not_found("User is not assigned to this grade"));
    }
    info!(user_id = %user_id, grade_id = %grade_id, "Removed grade from user");
    Ok(Json(json!({ "message": "Grade removed successfully" })))
}
