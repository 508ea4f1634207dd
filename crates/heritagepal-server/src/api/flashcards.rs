//! `/api/flashcards` endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use heritagepal_store::{
    FlashcardFilter, FlashcardSessionRecord, FlashcardSetRecord, NewFlashcardSession,
    NewFlashcardSet, Topic,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::{count_from_value, grade_from_str, non_empty, require_grade, ApiError, AppState};
use crate::auth::{AuthUser, MaybeUser};
use crate::learning::{Flashcard, Parsed};
use crate::prompt::{self, truncate_chars, DEFAULT_DECK_SIZE, MAX_SOURCE_CHARS};

/// Topics used as context for a generated deck.
const DECK_TOPIC_LIMIT: usize = 10;

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handle_list_sets))
        .route("/sets", get(handle_list_sets))
        .route("/topics", get(handle_deck_topics))
        .route("/generate", post(handle_generate))
        .route("/set/:id", get(handle_get_set))
        .route("/history", get(handle_history))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SetQuery {
    grade: Option<String>,
    topic: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct TopicTitle {
    title: String,
}

#[derive(Debug, Clone, Serialize)]
struct TopicSummary {
    id: String,
    title: String,
}

/// A deck with its topic's title.
#[derive(Debug, Serialize)]
struct SetWithTopic {
    #[serde(flatten)]
    set: FlashcardSetRecord,
    topics: Option<TopicTitle>,
}

/// A study session with its topic's title.
#[derive(Debug, Serialize)]
struct SessionWithTopic {
    #[serde(flatten)]
    session: FlashcardSessionRecord,
    topic: Option<TopicTitle>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedDeck {
    session_id: String,
    topic_title: String,
    grade: Option<u8>,
    flashcards: Vec<Flashcard>,
    saved: bool,
    flashcard_set_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/flashcards/sets`.
async fn handle_list_sets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SetQuery>,
) -> Result<Json<Vec<SetWithTopic>>, ApiError> {
    let filter = FlashcardFilter {
        topic_id: query.topic.filter(|t| !t.is_empty()),
        grade: grade_from_str(query.grade.as_deref()),
    };
    let sets = state.store.list_flashcard_sets(filter).await?;
    let titles = topic_titles(&state).await?;

    Ok(Json(
        sets.into_iter()
            .map(|set| SetWithTopic {
                topics: title_of(&titles, set.topic_id.as_deref()),
                set,
            })
            .collect(),
    ))
}

/// Handler for `GET /api/flashcards/set/:id`.
async fn handle_get_set(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FlashcardSetRecord>, ApiError> {
    state
        .store
        .get_flashcard_set(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Flashcard set not found"))
}

/// Handler for `GET /api/flashcards/topics`: topics that have at least one deck.
async fn handle_deck_topics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TopicSummary>>, ApiError> {
    let sets = state
        .store
        .list_flashcard_sets(FlashcardFilter::default())
        .await?;
    let with_decks: Vec<String> = sets.into_iter().filter_map(|s| s.topic_id).collect();
    if with_decks.is_empty() {
        return Ok(Json(Vec::new()));
    }

    Ok(Json(
        state
            .store
            .list_topics()
            .await?
            .into_iter()
            .filter(|t| with_decks.contains(&t.id))
            .map(|t| TopicSummary {
                id: t.id,
                title: t.title,
            })
            .collect(),
    ))
}

/// Handler for `POST /api/flashcards/generate`.
///
/// Generates a deck from the named topic, or from the catalogue when only a
/// grade is given. Signed-in callers also get the deck saved along with a
/// study session; save failures are logged and reported as `saved: false`.
async fn handle_generate(
    State(state): State<Arc<AppState>>,
    user: MaybeUser,
    Json(body): Json<Value>,
) -> Result<Json<GeneratedDeck>, ApiError> {
    let topic_title = non_empty(body.get("topic"));
    let grade = match body.get("grade").filter(|g| !g.is_null()) {
        Some(raw) => Some(require_grade(Some(raw))?),
        None => None,
    };
    if topic_title.is_none() && grade.is_none() {
        return Err(ApiError::bad_request("Please provide either a topic or grade"));
    }
    let count = count_from_value(body.get("count")).unwrap_or(DEFAULT_DECK_SIZE);

    let topics: Vec<Topic> = match topic_title {
        Some(title) => {
            state
                .store
                .find_topics_by_title(title, DECK_TOPIC_LIMIT)
                .await?
        }
        None => state
            .store
            .list_topics()
            .await?
            .into_iter()
            .take(DECK_TOPIC_LIMIT)
            .collect(),
    };
    let Some(first) = topics.first() else {
        return Err(ApiError::not_found("No content found for this topic or grade"));
    };

    let context: String = topics
        .iter()
        .map(|topic| {
            let text = topic.content_text();
            let text = if text.is_empty() {
                "No content available"
            } else {
                truncate_chars(text, MAX_SOURCE_CHARS)
            };
            format!("Topic: {}\nContent: {text}\n\n", topic.title)
        })
        .collect();

    let parsed = state
        .learning_sets()
        .flashcards_or_fallback(&prompt::flashcard_deck_prompt(&context, grade, count))
        .await;
    if let Parsed::Fallback { reason, .. } = &parsed {
        warn!(reason = %reason, "Flashcard generation unusable, using fallback deck");
    }
    let flashcards = parsed.into_inner();

    let session_id = Uuid::new_v4().to_string();
    let mut flashcard_set_id = None;

    if let Some(user_id) = user.id() {
        match save_deck(&state, first, grade, user_id, &flashcards).await {
            Ok(id) => flashcard_set_id = Some(id),
            Err(e) => warn!(user_id, error = ?e, "Failed to save flashcard set"),
        }

        let session = NewFlashcardSession {
            user_id: user_id.to_string(),
            session_id: session_id.clone(),
            topic_id: Some(first.id.clone()),
            flashcard_count: u32::try_from(flashcards.len()).unwrap_or(u32::MAX),
        };
        if let Err(e) = state.store.insert_flashcard_session(session).await {
            warn!(user_id, error = %e, "Failed to record flashcard session");
        }
    }

    info!(
        topic = %first.title,
        cards = flashcards.len(),
        saved = flashcard_set_id.is_some(),
        "Generated flashcard deck"
    );

    Ok(Json(GeneratedDeck {
        session_id,
        topic_title: first.title.clone(),
        grade,
        flashcards,
        saved: flashcard_set_id.is_some(),
        flashcard_set_id,
    }))
}

/// Handler for `GET /api/flashcards/history`.
async fn handle_history(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<SessionWithTopic>>, ApiError> {
    let sessions = state.store.list_flashcard_sessions(&user.id).await?;
    let titles = topic_titles(&state).await?;

    Ok(Json(
        sessions
            .into_iter()
            .map(|session| SessionWithTopic {
                topic: title_of(&titles, session.topic_id.as_deref()),
                session,
            })
            .collect(),
    ))
}

// ============================================================================
// Helpers
// ============================================================================

async fn save_deck(
    state: &AppState,
    topic: &Topic,
    grade: Option<u8>,
    user_id: &str,
    flashcards: &[Flashcard],
) -> Result<String, ApiError> {
    let grade_label = grade.map_or_else(|| "all".to_string(), |g| g.to_string());
    let set = state
        .store
        .insert_flashcard_set(NewFlashcardSet {
            title: format!("{} Flashcards", topic.title),
            description: Some(format!(
                "Flashcards about {} for grade {grade_label} students",
                topic.title
            )),
            topic_id: Some(topic.id.clone()),
            grade,
            user_id: Some(user_id.to_string()),
            is_ai_generated: true,
            flashcards: serde_json::to_value(flashcards).map_err(crate::HeritageError::from)?,
        })
        .await?;
    Ok(set.id)
}

async fn topic_titles(state: &AppState) -> Result<HashMap<String, String>, ApiError> {
    Ok(state
        .store
        .list_topics()
        .await?
        .into_iter()
        .map(|t| (t.id, t.title))
        .collect())
}

fn title_of(titles: &HashMap<String, String>, topic_id: Option<&str>) -> Option<TopicTitle> {
    topic_id
        .and_then(|id| titles.get(id))
        .map(|title| TopicTitle {
            title: title.clone(),
        })
}
