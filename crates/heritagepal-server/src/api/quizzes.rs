//! `/api/quizzes` endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use heritagepal_store::{
    ContentFilter, NewPracticeExam, NewQuizResult, PracticeExamRecord, QuizFilter, QuizRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{
    count_from_value, grade_for_level, grade_from_value, topic_ids_for_grade, ApiError, AppState,
};
use crate::auth::MaybeUser;
use crate::prompt::{self, truncate_chars, DEFAULT_EXAM_QUESTIONS};
use crate::scoring::{score_answers, QuizScore};
use crate::HeritageError;

/// Content rows used as practice exam context.
const EXAM_CONTEXT_ROWS: usize = 10;
/// Characters of each content row included in practice exam context.
const EXAM_CONTEXT_CHARS: usize = 1000;

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handle_list_quizzes))
        .route("/topics", get(handle_quiz_topics))
        .route("/practice-exam", post(handle_practice_exam))
        .route("/:id", get(handle_get_quiz))
        .route("/:id/submit", post(handle_submit))
}

#[derive(Debug, Deserialize)]
struct QuizQuery {
    /// Grade id; restricts to the grade's topics.
    grade: Option<String>,
    topic: Option<String>,
    difficulty: Option<String>,
}

/// A quiz listing entry, without its questions.
#[derive(Debug, Serialize)]
struct QuizSummary {
    id: String,
    title: String,
    description: Option<String>,
    topic_id: Option<String>,
    difficulty: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl From<QuizRecord> for QuizSummary {
    fn from(quiz: QuizRecord) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            topic_id: quiz.topic_id,
            difficulty: quiz.difficulty,
            created_at: quiz.created_at,
        }
    }
}

/// Handler for `GET /api/quizzes`.
async fn handle_list_quizzes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuizQuery>,
) -> Result<Json<Vec<QuizSummary>>, ApiError> {
    let mut filter = QuizFilter {
        difficulty: query.difficulty.filter(|d| !d.is_empty()),
        ..QuizFilter::default()
    };

    if let Some(grade_id) = query.grade.as_deref().filter(|g| !g.is_empty()) {
        match topic_ids_for_grade(&state, grade_id).await {
            Ok(ids) if !ids.is_empty() => filter.topic_ids = Some(ids),
            Ok(_) => {}
            Err(e) => warn!(grade_id, error = ?e, "Ignoring grade filter"),
        }
    }
    if let Some(topic) = query.topic.filter(|t| !t.is_empty()) {
        filter.topic_ids = match filter.topic_ids {
            Some(ids) if !ids.contains(&topic) => Some(Vec::new()),
            _ => Some(vec![topic]),
        };
    }

    let quizzes = state.store.list_quizzes(filter).await?;
    Ok(Json(quizzes.into_iter().map(QuizSummary::from).collect()))
}

/// Handler for `GET /api/quizzes/:id`.
async fn handle_get_quiz(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<QuizRecord>, ApiError> {
    state
        .store
        .get_quiz(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Quiz not found"))
}

/// Handler for `POST /api/quizzes/practice-exam`.
///
/// Builds an exam from the grade's newest content. Unusable generation
/// output is replaced by the fallback quiz.
async fn handle_practice_exam(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<PracticeExamRecord>), ApiError> {
    let raw_grade = body
        .get("grade")
        .filter(|g| !g.is_null() && g.as_str() != Some(""))
        .ok_or_else(|| ApiError::bad_request("Grade is required"))?;
    let level =
        grade_from_value(Some(raw_grade)).ok_or_else(|| ApiError::not_found("Grade not found"))?;
    let question_count =
        count_from_value(body.get("questionCount")).unwrap_or(DEFAULT_EXAM_QUESTIONS);

    let grade = grade_for_level(&state, level).await?;
    let topic_ids = topic_ids_for_grade(&state, &grade.id).await?;
    let content = if topic_ids.is_empty() {
        Vec::new()
    } else {
        state
            .store
            .list_content(ContentFilter {
                topic_ids: Some(topic_ids),
                limit: Some(EXAM_CONTEXT_ROWS),
                ..ContentFilter::default()
            })
            .await?
    };
    if content.is_empty() {
        return Err(ApiError::not_found("No content found for this grade"));
    }

    let titles: HashMap<String, String> = state
        .store
        .list_topics()
        .await?
        .into_iter()
        .map(|t| (t.id, t.title))
        .collect();

    let selected: Option<Vec<&str>> = body
        .get("topics")
        .and_then(Value::as_array)
        .filter(|topics| !topics.is_empty())
        .map(|topics| topics.iter().filter_map(Value::as_str).collect());

    let context: String = content
        .iter()
        .filter(|row| match (&selected, row.topic_id.as_deref()) {
            (Some(selected), Some(id)) => selected.contains(&id),
            (Some(_), None) => false,
            (None, _) => true,
        })
        .map(|row| {
            let topic_title = row
                .topic_id
                .as_ref()
                .and_then(|id| titles.get(id))
                .map_or("Unknown Topic", String::as_str);
            let text = row
                .processed_content
                .as_deref()
                .filter(|t| !t.is_empty())
                .map_or("No content available", |t| truncate_chars(t, EXAM_CONTEXT_CHARS));
            format!(
                "Topic: {topic_title}\nTitle: {}\nContent: {text}\n\n",
                row.title
            )
        })
        .collect();

    let parsed = state
        .learning_sets()
        .questions_or_fallback(&prompt::practice_exam_prompt(level, &context, question_count))
        .await;
    if let crate::Parsed::Fallback { reason, .. } = &parsed {
        warn!(grade = level, reason = %reason, "Practice exam generation unusable, using fallback");
    }
    let questions = serde_json::to_string(&parsed.into_inner()).map_err(HeritageError::from)?;

    let exam = state
        .store
        .insert_practice_exam(NewPracticeExam {
            title: format!("Grade {level} Practice Exam"),
            description: Some(format!(
                "Comprehensive practice exam for grade {level} Social Studies"
            )),
            grade_id: grade.id,
            questions,
        })
        .await?;
    info!(exam_id = %exam.id, grade = level, "Created practice exam");

    Ok((StatusCode::CREATED, Json(exam)))
}

/// Handler for `GET /api/quizzes/topics`: titles of topics that have quizzes.
async fn handle_quiz_topics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let topics = state.store.list_quiz_topics().await?;
    Ok(Json(topics.into_iter().map(|t| t.title).collect()))
}

/// Handler for `POST /api/quizzes/:id/submit`.
///
/// The result row is written in the background when the submission carries
/// a session id or comes from a signed-in user.
async fn handle_submit(
    State(state): State<Arc<AppState>>,
    user: MaybeUser,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<QuizScore>, ApiError> {
    let Some(answers) = body.get("answers").and_then(Value::as_array) else {
        return Err(ApiError::bad_request("Please provide an array of answers"));
    };

    let quiz = state
        .store
        .get_quiz(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Quiz not found"))?;

    let score = score_answers(&quiz.questions, answers).map_err(|e| HeritageError::CorruptQuiz {
        quiz_id: quiz.id.clone(),
        message: e.to_string(),
    })?;

    let session_id = body
        .get("sessionId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let user_id = user.id().map(str::to_string);

    if session_id.is_some() || user_id.is_some() {
        let store = Arc::clone(&state.store);
        let result = NewQuizResult {
            quiz_id: quiz.id,
            session_id,
            user_id,
            score: score.percentage,
            correct_count: score.correct_count,
            total_questions: score.total_questions,
        };
        tokio::spawn(async move {
            if let Err(e) = store.insert_quiz_result(result).await {
                warn!(error = %e, "Failed to record quiz result");
            }
        });
    }

    info!(quiz_id = %id, percentage = score.percentage, "Scored quiz submission");
    Ok(Json(score))
}
