//! `/api/chat` endpoints: the AI tutor.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use heritagepal_store::{ChatMessage, ChatRole, ChatSessionRecord, ContentFilter};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::{grade_from_value, non_empty, ApiError, AppState};
use crate::auth::{AuthUser, MaybeUser};
use crate::prompt::{self, truncate_chars};

/// Messages of recent history included in the prompt.
const HISTORY_WINDOW: usize = 5;
/// Content rows included in the prompt when a grade is given.
const CONTEXT_ROWS: usize = 5;
/// Characters of each content row included in the prompt.
const CONTEXT_CHARS: usize = 2000;
/// Characters of the opening message kept as a session's topic.
const SESSION_TOPIC_CHARS: usize = 50;

/// Reply sent when the generation service cannot be reached.
pub const APOLOGY: &str = "I'm sorry, I'm currently having trouble connecting to my knowledge \
base. This could be due to a configuration issue or high demand. Please try again later or \
contact the administrator if this problem persists.";

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/message", post(handle_message))
        .route("/history", get(handle_sessions))
        .route("/history/:session_id", get(handle_history))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatReply {
    message: String,
    session_id: String,
}

/// Handler for `POST /api/chat/message`.
///
/// Both the student's message and the reply are stored; storage failures
/// are logged and do not fail the request.
async fn handle_message(
    State(state): State<Arc<AppState>>,
    user: MaybeUser,
    Json(body): Json<Value>,
) -> Result<Json<ChatReply>, ApiError> {
    let Some(message) = non_empty(body.get("message")) else {
        return Err(ApiError::bad_request("Please provide a message"));
    };
    let grade = grade_from_value(body.get("grade"));
    let given_session = non_empty(body.get("sessionId"));
    let session_id =
        given_session.map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    store_message(&state, &session_id, ChatRole::User, message).await;

    if let (Some(user_id), None) = (user.id(), given_session) {
        let topic = truncate_chars(message, SESSION_TOPIC_CHARS);
        if let Err(e) = state
            .store
            .insert_chat_session(user_id, &session_id, topic)
            .await
        {
            warn!(user_id, session_id = %session_id, error = %e, "Failed to register chat session");
        }
    }

    let context = match grade {
        Some(level) => content_context(&state, level).await,
        None => String::new(),
    };
    let conversation = conversation_context(&state, &session_id).await;

    let reply = match state
        .generator
        .generate(&prompt::chat_prompt(message, &conversation, &context, grade))
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Tutor generation failed, sending apology");
            APOLOGY.to_string()
        }
    };

    store_message(&state, &session_id, ChatRole::Assistant, &reply).await;
    info!(session_id = %session_id, grade = ?grade, "Answered chat message");

    Ok(Json(ChatReply {
        message: reply,
        session_id,
    }))
}

/// Handler for `GET /api/chat/history/:session_id`: messages, oldest first.
async fn handle_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    Ok(Json(state.store.chat_messages(&session_id).await?))
}

/// Handler for `GET /api/chat/history`: the caller's sessions, newest first.
async fn handle_sessions(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<ChatSessionRecord>>, ApiError> {
    Ok(Json(state.store.list_chat_sessions(&user.id).await?))
}

async fn store_message(state: &AppState, session_id: &str, role: ChatRole, content: &str) {
    if let Err(e) = state
        .store
        .insert_chat_message(session_id, role, content)
        .await
    {
        warn!(session_id, role = ?role, error = %e, "Failed to store chat message");
    }
}

/// Formats the session's recent messages as `Student:`/`HeritagePal:` lines.
async fn conversation_context(state: &AppState, session_id: &str) -> String {
    match state
        .store
        .recent_chat_messages(session_id, HISTORY_WINDOW)
        .await
    {
        Ok(messages) => messages
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    ChatRole::User => "Student",
                    ChatRole::Assistant => "HeritagePal",
                };
                format!("{speaker}: {}\n", m.content)
            })
            .collect(),
        Err(e) => {
            warn!(session_id, error = %e, "Failed to load chat history");
            String::new()
        }
    }
}

async fn content_context(state: &AppState, grade: u8) -> String {
    let filter = ContentFilter {
        grade: Some(grade),
        limit: Some(CONTEXT_ROWS),
        ..ContentFilter::default()
    };
    match state.store.list_content(filter).await {
        Ok(rows) => rows
            .iter()
            .map(|row| {
                let text = row
                    .processed_content
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .map_or("No content available", |t| truncate_chars(t, CONTEXT_CHARS));
                format!("{}: {text}\n\n", row.title)
            })
            .collect(),
        Err(e) => {
            warn!(grade, error = %e, "Failed to load chat context");
            String::new()
        }
    }
}
