//! HTTP API for HeritagePAL.
//!
//! All endpoints live under `/api`; `/healthz` sits at the root.
//!
//! # Endpoints
//!
//! - `/api/content/*` - Topic listings, summaries, search, and on-the-fly learning sets
//! - `/api/topics/*` - Topic catalogue (admin writes)
//! - `/api/grades/*` - Grades and grade/topic assignments (admin writes)
//! - `/api/quizzes/*` - Quizzes, practice exams, and answer scoring
//! - `/api/flashcards/*` - Flashcard decks and generation
//! - `/api/chat/*` - The AI tutor
//! - `/api/users/*` - Profile, learning sessions, and history (authenticated)
//! - `/api/admin/*` - Content administration (admin only)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use heritagepal_genai::OfflineGenerator;
//! use heritagepal_server::{create_router, AppState, Config};
//! use heritagepal_store::MemoryStore;
//!
//! # async fn example() {
//! let state = AppState::new(
//!     Config::default(),
//!     Arc::new(MemoryStore::seeded()),
//!     Arc::new(OfflineGenerator),
//! );
//!
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

mod admin;
mod chat;
mod content;
mod flashcards;
mod grades;
mod quizzes;
mod topics;
mod users;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use heritagepal_genai::TextGenerator;
use heritagepal_store::{Grade, Store, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, warn};

use crate::{Config, HeritageError, LearningSetGenerator, PersistenceCoordinator};

/// Highest grade level served.
pub const MAX_GRADE: u8 = 6;

const INVALID_GRADE: &str = "Valid grade level (1-6) is required";

/// Client-facing messages for failures whose detail stays in the logs.
const GENERATION_FAILED: &str = "Failed to generate learning content";
const DATABASE_ERROR: &str = "Database error";
const INTERNAL_ERROR: &str = "Internal server error";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
///
/// Holds the configuration and the two external collaborators. Both are
/// trait objects so tests can substitute in-memory and scripted versions.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Database and auth service.
    pub store: Arc<dyn Store>,
    /// Text generation service.
    pub generator: Arc<dyn TextGenerator>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Creates a new `AppState`.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn Store>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            config,
            store,
            generator,
        }
    }

    /// Returns a learning-set generator over this state's generation service.
    #[must_use]
    pub fn learning_sets(&self) -> LearningSetGenerator {
        LearningSetGenerator::new(Arc::clone(&self.generator))
    }

    /// Returns a persistence coordinator over this state's store.
    #[must_use]
    pub fn persistence(&self) -> PersistenceCoordinator {
        PersistenceCoordinator::new(Arc::clone(&self.store))
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Error body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

/// Error type for API handlers; each variant maps to one status code.
#[derive(Debug)]
pub enum ApiError {
    /// 400: missing or invalid input.
    BadRequest(String),
    /// 401: missing or invalid token.
    Unauthorized(String),
    /// 403: authenticated but not allowed.
    Forbidden(String),
    /// 404: referenced row does not exist.
    NotFound(String),
    /// 409: row already exists.
    Conflict(String),
    /// 500: store, generation, or data failure.
    Internal(String),
}

impl ApiError {
    /// Creates a `BadRequest` error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<HeritageError> for ApiError {
    fn from(err: HeritageError) -> Self {
        match err {
            HeritageError::InvalidInput(message) => Self::BadRequest(message),
            HeritageError::NotFound { .. } => Self::NotFound(err.to_string()),
            HeritageError::Store(StoreError::Api {
                status: 409,
                message,
            }) => Self::Conflict(message),
            HeritageError::CorruptQuiz { quiz_id, message } => {
                error!(quiz_id = %quiz_id, error = %message, "Stored quiz questions are corrupt");
                Self::Internal("Error parsing quiz questions".to_string())
            }
            HeritageError::GenerationFailed(source) => {
                error!(kind = %source.kind(), error = %source, "Generation service call failed");
                Self::Internal(GENERATION_FAILED.to_string())
            }
            HeritageError::PersistFailed { artifact, source } => {
                error!(%artifact, error = %source, "Learning session was not saved");
                Self::Internal(format!("Failed to save {artifact}"))
            }
            HeritageError::Store(source) => {
                error!(error = %source, "Store request failed");
                Self::Internal(DATABASE_ERROR.to_string())
            }
            other => {
                error!(error = %other, "Request failed internally");
                Self::Internal(INTERNAL_ERROR.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        HeritageError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Internal(msg) => msg,
        };

        if status.is_server_error() {
            error!(status = %status, error = %message, "Request failed");
        } else {
            warn!(status = %status, error = %message, "Request rejected");
        }

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

// ============================================================================
// Request helpers
// ============================================================================

/// Reads a grade level from a JSON number or numeric string.
pub(crate) fn grade_from_value(value: Option<&Value>) -> Option<u8> {
    let level = match value? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u8::try_from(level).ok().filter(|g| (1..=MAX_GRADE).contains(g))
}

/// Reads a grade level from a query or path string.
pub(crate) fn grade_from_str(value: Option<&str>) -> Option<u8> {
    value?
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|g| (1..=MAX_GRADE).contains(g))
}

/// Like [`grade_from_value`], failing with the standard message.
pub(crate) fn require_grade(value: Option<&Value>) -> Result<u8, ApiError> {
    grade_from_value(value).ok_or_else(|| ApiError::bad_request(INVALID_GRADE))
}

/// Like [`grade_from_str`], failing with the standard message.
pub(crate) fn require_grade_str(value: Option<&str>) -> Result<u8, ApiError> {
    grade_from_str(value).ok_or_else(|| ApiError::bad_request(INVALID_GRADE))
}

/// Reads a non-empty string field.
pub(crate) fn non_empty(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Fetches the grade with `level`, failing with 404.
pub(crate) async fn grade_for_level(state: &AppState, level: u8) -> Result<Grade, ApiError> {
    state
        .store
        .grade_by_level(level)
        .await?
        .ok_or_else(|| ApiError::not_found("Grade not found"))
}

/// Lists the ids of topics assigned to `grade_id`.
pub(crate) async fn topic_ids_for_grade(
    state: &AppState,
    grade_id: &str,
) -> Result<Vec<String>, ApiError> {
    Ok(state
        .store
        .list_grade_topics()
        .await?
        .into_iter()
        .filter(|gt| gt.grade_id == grade_id)
        .map(|gt| gt.topic_id)
        .collect())
}

/// Returns `true` if `topic_id` is assigned to `grade_id`.
pub(crate) async fn is_assigned(
    state: &AppState,
    grade_id: &str,
    topic_id: &str,
) -> Result<bool, ApiError> {
    Ok(state
        .store
        .list_grade_topics()
        .await?
        .iter()
        .any(|gt| gt.grade_id == grade_id && gt.topic_id == topic_id))
}

/// Reads a positive count from a JSON number or numeric string.
pub(crate) fn count_from_value(value: Option<&Value>) -> Option<usize> {
    let count = match value? {
        Value::Number(n) => usize::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (count > 0).then_some(count)
}

// ============================================================================
// Router Setup
// ============================================================================

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Creates the HTTP router with all API endpoints.
///
/// # Arguments
///
/// * `state` - The shared application state
///
/// # Returns
///
/// An axum `Router` configured with:
/// - All API routes under `/api`
/// - `/healthz` at the root
/// - CORS restricted to the configured origins
/// - Tracing middleware for request logging
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let api_routes = Router::new()
        .nest("/content", content::routes())
        .nest("/topics", topics::routes())
        .nest("/grades", grades::routes())
        .nest("/quizzes", quizzes::routes())
        .nest("/flashcards", flashcards::routes())
        .nest("/chat", chat::routes())
        .nest("/users", users::routes())
        .nest("/admin", admin::routes());

    Router::new()
        .route("/healthz", get(handle_health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Handler for `GET /healthz`.
async fn handle_health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "Server is up and running",
    }))
}

// ============================================================================
// Tests
// ============================================================================
