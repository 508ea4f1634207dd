//! `/api/grades` endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use heritagepal_store::{Grade, GradeTopic, NewGrade, Topic};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use super::{non_empty, ApiError, AppState, MAX_GRADE};
use crate::auth::AdminUser;

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handle_list_grades).post(handle_create_grade))
        .route("/topic-assignment", post(handle_assign_topic))
        .route("/:id", get(handle_get_grade))
        .route("/:id/topics", get(handle_grade_topics))
        .route("/:id/topics/:topic_id", delete(handle_remove_topic))
}

#[derive(Debug, Serialize)]
struct GradeCreated {
    message: &'static str,
    grade: Grade,
}

#[derive(Debug, Serialize)]
struct TopicAssigned {
    message: &'static str,
    assignment: GradeTopic,
}

/// Handler for `GET /api/grades`.
async fn handle_list_grades(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Grade>>, ApiError> {
    Ok(Json(state.store.list_grades().await?))
}

/// Handler for `GET /api/grades/:id`.
async fn handle_get_grade(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Grade>, ApiError> {
    Ok(Json(existing_grade(&state, &id).await?))
}

/// Handler for `GET /api/grades/:id/topics`.
async fn handle_grade_topics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Topic>>, ApiError> {
    existing_grade(&state, &id).await?;
    let topic_ids = super::topic_ids_for_grade(&state, &id).await?;

    Ok(Json(
        state
            .store
            .list_topics()
            .await?
            .into_iter()
            .filter(|t| topic_ids.contains(&t.id))
            .collect(),
    ))
}

/// Handler for `POST /api/grades`.
async fn handle_create_grade(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<GradeCreated>), ApiError> {
    let level = body.get("level");
    let name = non_empty(body.get("name"));

    let mut errors = Vec::new();
    let level = match level {
        None | Some(Value::Null) => {
            errors.push("Grade level is required");
            None
        }
        Some(value) => {
            let level = value
                .as_u64()
                .and_then(|l| u8::try_from(l).ok())
                .filter(|l| (1..=MAX_GRADE).contains(l));
            if level.is_none() {
                errors.push("Grade level must be an integer between 1 and 6");
            }
            level
        }
    };
    if name.is_none() {
        errors.push("Grade name is required");
    }
    let (Some(level), Some(name)) = (level, name) else {
        return Err(ApiError::bad_request(format!(
            "Invalid grade data: {}",
            errors.join(", ")
        )));
    };

    if state.store.grade_by_level(level).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "Grade with level {level} already exists"
        )));
    }

    let grade = state
        .store
        .create_grade(NewGrade {
            level,
            name: name.to_string(),
            description: non_empty(body.get("description")).map(str::to_string),
        })
        .await?;
    info!(grade_id = %grade.id, level, admin_id = %admin.id, "Created grade");

    Ok((
        StatusCode::CREATED,
        Json(GradeCreated {
            message: "Grade created successfully",
            grade,
        }),
    ))
}

/// Handler for `POST /api/grades/topic-assignment`.
async fn handle_assign_topic(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<TopicAssigned>), ApiError> {
    let grade_id = non_empty(body.get("grade_id"));
    let topic_id = non_empty(body.get("topic_id"));

    let mut errors = Vec::new();
    if grade_id.is_none() {
        errors.push("Grade ID is required");
    }
    if topic_id.is_none() {
        errors.push("Topic ID is required");
    }
    let (Some(grade_id), Some(topic_id)) = (grade_id, topic_id) else {
        return Err(ApiError::bad_request(format!(
            "Invalid assignment data: {}",
            errors.join(", ")
        )));
    };

    existing_grade(&state, grade_id).await?;
    if state.store.get_topic(topic_id).await?.is_none() {
        return Err(ApiError::not_found("Topic not found"));
    }
    if super::is_assigned(&state, grade_id, topic_id).await? {
        return Err(ApiError::Conflict(
            "Topic is already assigned to this grade".to_string(),
        ));
    }

    state
        .store
        .assign_topic_to_grade(grade_id, topic_id)
        .await?;
    info!(grade_id, topic_id, admin_id = %admin.id, "Assigned topic to grade");

    Ok((
        StatusCode::CREATED,
        Json(TopicAssigned {
            message: "Topic assigned to grade successfully",
            assignment: GradeTopic {
                grade_id: grade_id.to_string(),
                topic_id: topic_id.to_string(),
            },
        }),
    ))
}

/// Handler for `DELETE /api/grades/:id/topics/:topic_id`.
async fn handle_remove_topic(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path((grade_id, topic_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    if !state
        .store
        .remove_topic_from_grade(&grade_id, &topic_id)
        .await?
    {
        return Err(ApiError::not_found("Topic is not assigned to this grade"));
    }
    info!(
        grade_id = %grade_id,
        topic_id = %topic_id,
        admin_id = %admin.id,
        "Removed topic from grade"
    );
    Ok(Json(
        json!({ "message": "Topic removed from grade successfully" }),
    ))
}

async fn existing_grade(state: &AppState, id: &str) -> Result<Grade, ApiError> {
    state
        .store
        .get_grade(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Grade not found"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};
    use heritagepal_genai::ScriptedGenerator;
    use heritagepal_store::{MemoryStore, Store, UserProfile};
    use serde_json::json;

    use super::super::tests::{router, seeded_store, send, topic_id, ADMIN_TOKEN, STUDENT_TOKEN};

    fn generator() -> Arc<ScriptedGenerator> {
        Arc::new(ScriptedGenerator::new(""))
    }

    #[tokio::test]
    async fn test_grades_are_ordered_by_level() {
        let store = seeded_store().await;
        let (status, body) =
            send(router(store, generator()), Method::GET, "/api/grades", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let levels: Vec<u64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["level"].as_u64().unwrap())
            .collect();
        assert_eq!(levels, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_get_grade_and_topics() {
        let store = seeded_store().await;
        let grade = store.grade_by_level(1).await.unwrap().unwrap();

        let (status, body) = send(
            router(store.clone(), generator()),
            Method::GET,
            &format!("/api/grades/{}", grade.id),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Grade 1");

        let (status, body) = send(
            router(store.clone(), generator()),
            Method::GET,
            &format!("/api/grades/{}/topics", grade.id),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["title"].as_str().unwrap())
            .collect();
        assert!(titles.contains(&"My Family"));
        assert!(titles.contains(&"Our Community"));

        let (status, body) =
            send(router(store, generator()), Method::GET, "/api/grades/missing", None, None)
                .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Grade not found");
    }

    #[tokio::test]
    async fn test_create_grade_conflicts_on_existing_level() {
        let store = seeded_store().await;
        let (status, body) = send(
            router(store, generator()),
            Method::POST,
            "/api/grades",
            Some(ADMIN_TOKEN),
            Some(json!({"level": 3, "name": "Grade 3"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Grade with level 3 already exists");
    }

    #[tokio::test]
    async fn test_create_grade() {
        let store = Arc::new(MemoryStore::new());
        store
            .register_token(
                ADMIN_TOKEN,
                UserProfile {
                    id: "admin-1".to_string(),
                    email: None,
                    name: None,
                    role: "admin".to_string(),
                },
            )
            .await;

        let (status, body) = send(
            router(store.clone(), generator()),
            Method::POST,
            "/api/grades",
            Some(ADMIN_TOKEN),
            Some(json!({"level": 2, "name": "Grade 2", "description": "Second year"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Grade created successfully");
        assert_eq!(body["grade"]["level"], 2);
        assert!(store.grade_by_level(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_grade_validation() {
        let store = seeded_store().await;
        let (status, body) = send(
            router(store.clone(), generator()),
            Method::POST,
            "/api/grades",
            Some(ADMIN_TOKEN),
            Some(json!({"level": 9})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Invalid grade data: Grade level must be an integer between 1 and 6, Grade name is required"
        );

        let (status, _) = send(
            router(store, generator()),
            Method::POST,
            "/api/grades",
            Some(STUDENT_TOKEN),
            Some(json!({"level": 1, "name": "Grade 1"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_assign_and_remove_topic() {
        let store = seeded_store().await;
        let grade = store.grade_by_level(6).await.unwrap().unwrap();
        let topic = topic_id(&store, "My Family").await;
        let body = json!({"grade_id": grade.id, "topic_id": topic});

        let (status, response) = send(
            router(store.clone(), generator()),
            Method::POST,
            "/api/grades/topic-assignment",
            Some(ADMIN_TOKEN),
            Some(body.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(response["assignment"]["topic_id"], topic.as_str());

        let (status, response) = send(
            router(store.clone(), generator()),
            Method::POST,
            "/api/grades/topic-assignment",
            Some(ADMIN_TOKEN),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(response["error"], "Topic is already assigned to this grade");

        let uri = format!("/api/grades/{}/topics/{topic}", grade.id);
        let (status, response) = send(
            router(store.clone(), generator()),
            Method::DELETE,
            &uri,
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["message"], "Topic removed from grade successfully");

        let (status, response) =
            send(router(store, generator()), Method::DELETE, &uri, Some(ADMIN_TOKEN), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(response["error"], "Topic is not assigned to this grade");
    }

    #[tokio::test]
    async fn test_assignment_validation() {
        let store = seeded_store().await;
        let (status, body) = send(
            router(store, generator()),
            Method::POST,
            "/api/grades/topic-assignment",
            Some(ADMIN_TOKEN),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Invalid assignment data: Grade ID is required, Topic ID is required"
        );
    }
}
