//! `/api/topics` endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use heritagepal_store::{Grade, NewTopic, Topic, TopicUpdate, TopicView};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{non_empty, ApiError, AppState};
use crate::auth::{AdminUser, AuthUser};

const NO_TOPIC_ACCESS: &str = "You do not have access to this topic";

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handle_list_topics).post(handle_create_topic))
        .route(
            "/:id",
            get(handle_get_topic)
                .put(handle_update_topic)
                .delete(handle_delete_topic),
        )
        .route(
            "/:id/grades",
            get(handle_topic_grades).post(handle_assign_topic_grades),
        )
        .route("/:id/view", post(handle_record_view))
}

#[derive(Debug, Deserialize)]
struct TopicQuery {
    grade_id: Option<String>,
}

/// A topic with the grades it is assigned to.
#[derive(Debug, Serialize)]
struct TopicWithGrades {
    #[serde(flatten)]
    topic: Topic,
    grades: Vec<Grade>,
}

/// Handler for `GET /api/topics`.
async fn handle_list_topics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopicQuery>,
) -> Result<Json<Vec<Topic>>, ApiError> {
    let topics = state.store.list_topics().await?;

    let Some(grade_id) = query.grade_id.filter(|g| !g.is_empty()) else {
        return Ok(Json(topics));
    };

    let assigned: Vec<String> = state
        .store
        .list_grade_topics()
        .await?
        .into_iter()
        .filter(|gt| gt.grade_id == grade_id)
        .map(|gt| gt.topic_id)
        .collect();

    Ok(Json(
        topics
            .into_iter()
            .filter(|t| assigned.contains(&t.id))
            .collect(),
    ))
}

/// Handler for `GET /api/topics/:id`.
async fn handle_get_topic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TopicWithGrades>, ApiError> {
    let topic = existing_topic(&state, &id).await?;
    let grades = match grades_for_topic(&state, &id).await {
        Ok(grades) => grades,
        Err(e) => {
            warn!(topic_id = %id, error = ?e, "Failed to load topic grades");
            Vec::new()
        }
    };
    Ok(Json(TopicWithGrades { topic, grades }))
}

/// Handler for `GET /api/topics/:id/grades`.
async fn handle_topic_grades(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Grade>>, ApiError> {
    existing_topic(&state, &id).await?;
    Ok(Json(grades_for_topic(&state, &id).await?))
}

/// Handler for `POST /api/topics`.
async fn handle_create_topic(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Topic>), ApiError> {
    let title = non_empty(body.get("title"));
    let content = non_empty(body.get("content"));

    let mut errors = Vec::new();
    if title.is_none() {
        errors.push("Topic title is required");
    }
    if content.is_none() {
        errors.push("Topic content is required");
    }
    let (Some(title), Some(content)) = (title, content) else {
        return Err(ApiError::bad_request(format!(
            "Invalid topic data: {}",
            errors.join(", ")
        )));
    };

    let topic = state
        .store
        .create_topic(NewTopic {
            title: title.to_string(),
            description: non_empty(body.get("description")).map(str::to_string),
            content: content.to_string(),
        })
        .await?;
    info!(topic_id = %topic.id, admin_id = %admin.id, "Created topic");

    if let Some(grade_ids) = grade_ids(&body) {
        assign_grades(&state, &topic.id, &grade_ids).await;
    }

    Ok((StatusCode::CREATED, Json(topic)))
}

/// Handler for `PUT /api/topics/:id`.
///
/// Absent or empty fields keep their current value. A `grade_ids` array
/// replaces the topic's grade assignments.
async fn handle_update_topic(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Topic>, ApiError> {
    let update = TopicUpdate {
        title: non_empty(body.get("title")).map(str::to_string),
        description: body
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        content: non_empty(body.get("content")).map(str::to_string),
    };

    let topic = state
        .store
        .update_topic(&id, update)
        .await?
        .ok_or_else(|| ApiError::not_found("Topic not found"))?;
    info!(topic_id = %id, admin_id = %admin.id, "Updated topic");

    if let Some(grade_ids) = grade_ids(&body) {
        for assignment in state.store.list_grade_topics().await? {
            if assignment.topic_id == id {
                if let Err(e) = state
                    .store
                    .remove_topic_from_grade(&assignment.grade_id, &id)
                    .await
                {
                    warn!(topic_id = %id, error = %e, "Failed to remove grade assignment");
                }
            }
        }
        assign_grades(&state, &id, &grade_ids).await;
    }

    Ok(Json(topic))
}

/// Handler for `POST /api/topics/:id/grades`.
///
/// Replaces the topic's grade assignments with the `grade_ids` array.
async fn handle_assign_topic_grades(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let grade_ids = grade_ids(&body)
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| {
            ApiError::bad_request("Invalid assignment data: At least one grade ID is required")
        })?;
    existing_topic(&state, &id).await?;

    let known: Vec<String> = state
        .store
        .list_grades()
        .await?
        .into_iter()
        .map(|g| g.id)
        .collect();
    if let Some(unknown) = grade_ids.iter().find(|g| !known.contains(g)) {
        return Err(ApiError::bad_request(format!(
            "Error assigning topic to grades: unknown grade {unknown}"
        )));
    }

    let assignments = state.store.replace_topic_grades(&id, &grade_ids).await?;
    info!(
        topic_id = %id,
        admin_id = %admin.id,
        grades = assignments.len(),
        "Replaced topic grade assignments"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Topic assigned to grades successfully",
            "assignments": assignments,
        })),
    ))
}

/// Handler for `POST /api/topics/:id/view`.
///
/// A student who has chosen grades may only open topics taught in one of
/// them. Admins and students without chosen grades may open any topic.
async fn handle_record_view(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    existing_topic(&state, &id).await?;

    if !user.is_admin() {
        let chosen: Vec<String> = state
            .store
            .list_user_grades(&user.id)
            .await?
            .into_iter()
            .map(|g| g.id)
            .collect();
        if !chosen.is_empty() {
            let taught = state
                .store
                .list_grade_topics()
                .await?
                .iter()
                .any(|gt| gt.topic_id == id && chosen.contains(&gt.grade_id));
            if !taught {
                warn!(user_id = %user.id, topic_id = %id, "Topic outside the user's grades");
                return Err(ApiError::Forbidden(NO_TOPIC_ACCESS.to_string()));
            }
        }
    }

    state
        .store
        .record_topic_view(TopicView {
            user_id: user.id.clone(),
            topic_id: id.clone(),
            viewed_at: Utc::now(),
        })
        .await?;
    debug!(user_id = %user.id, topic_id = %id, "Recorded topic view");

    Ok(Json(json!({ "message": "Topic view recorded successfully" })))
}

/// Handler for `DELETE /api/topics/:id`.
async fn handle_delete_topic(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.store.delete_topic(&id).await? {
        return Err(ApiError::not_found("Topic not found"));
    }
    info!(topic_id = %id, admin_id = %admin.id, "Deleted topic");
    Ok(Json(json!({ "message": "Topic deleted successfully" })))
}

// ============================================================================
// Helpers
// ============================================================================

async fn existing_topic(state: &AppState, id: &str) -> Result<Topic, ApiError> {
    state
        .store
        .get_topic(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Topic not found"))
}

async fn grades_for_topic(state: &AppState, topic_id: &str) -> Result<Vec<Grade>, ApiError> {
    let grade_ids: Vec<String> = state
        .store
        .list_grade_topics()
        .await?
        .into_iter()
        .filter(|gt| gt.topic_id == topic_id)
        .map(|gt| gt.grade_id)
        .collect();

    Ok(state
        .store
        .list_grades()
        .await?
        .into_iter()
        .filter(|g| grade_ids.contains(&g.id))
        .collect())
}

fn grade_ids(body: &Value) -> Option<Vec<String>> {
    body.get("grade_ids")?.as_array().map(|ids| {
        ids.iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

/// Assigns a topic to each grade; failures are logged and skipped.
async fn assign_grades(state: &AppState, topic_id: &str, grade_ids: &[String]) {
    for grade_id in grade_ids {
        if let Err(e) = state.store.assign_topic_to_grade(grade_id, topic_id).await {
            warn!(
                topic_id = %topic_id,
                grade_id = %grade_id,
                error = %e,
                "Failed to assign topic to grade"
            );
        }
    }
}
