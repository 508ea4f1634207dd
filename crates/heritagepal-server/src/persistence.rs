//! Persistence of generated learning sets.
//!
//! The four rows of a learning session are written one after another. If a
//! write fails, the rows already written are deleted again in reverse order,
//! so callers see either a complete session or nothing.

use std::sync::Arc;

use heritagepal_store::{
    NewEducationalContent, NewFlashcardSet, NewLearningSession, NewQuiz, Store, StoreError,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Artifact, HeritageError, Result};
use crate::learning::LearningSet;

/// Identifiers of a persisted learning session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedLearningSession {
    /// The `user_learning_sessions` row.
    pub session_id: String,
    /// The summary row.
    pub content_id: String,
    /// The quiz row.
    pub quiz_id: String,
    /// The flashcard deck row.
    pub flashcard_set_id: String,
}

/// A row written during a save, kept for compensation.
#[derive(Debug)]
enum Written {
    Content(String),
    Quiz(String),
    FlashcardSet(String),
}

/// Writes learning sets to the store.
#[derive(Clone)]
pub struct PersistenceCoordinator {
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for PersistenceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceCoordinator").finish_non_exhaustive()
    }
}

impl PersistenceCoordinator {
    /// Creates a coordinator writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Saves `set` for `user_id` and links it with a learning session.
    ///
    /// # Errors
    ///
    /// Returns `HeritageError::PersistFailed` naming the artifact whose insert
    /// failed, after deleting the rows written before it.
    pub async fn save(
        &self,
        set: &LearningSet,
        user_id: &str,
        topic_id: &str,
        grade: u8,
    ) -> Result<SavedLearningSession> {
        let mut written = Vec::with_capacity(3);
        match self.write_all(set, user_id, topic_id, grade, &mut written).await {
            Ok(saved) => {
                info!(
                    session_id = %saved.session_id,
                    user_id,
                    topic_id,
                    grade,
                    "Saved learning session"
                );
                Ok(saved)
            }
            Err((artifact, source)) => {
                warn!(%artifact, error = %source, "Learning session insert failed, compensating");
                self.compensate(written).await;
                Err(HeritageError::persist_failed(artifact, source))
            }
        }
    }

    async fn write_all(
        &self,
        set: &LearningSet,
        user_id: &str,
        topic_id: &str,
        grade: u8,
        written: &mut Vec<Written>,
    ) -> std::result::Result<SavedLearningSession, (Artifact, StoreError)> {
        let summary = &set.educational_content;
        let content = self
            .store
            .insert_content(NewEducationalContent {
                title: summary.title.clone(),
                description: Some(summary.description.clone()),
                topic_id: Some(topic_id.to_string()),
                grade: Some(grade),
                source: Some(summary.source.clone()),
                raw_content: Some(summary.raw_content.clone()),
                processed_content: Some(summary.processed_content.clone()),
                user_id: Some(user_id.to_string()),
                is_ai_generated: true,
            })
            .await
            .map_err(|e| (Artifact::EducationalContent, e))?;
        written.push(Written::Content(content.id.clone()));

        let questions = serde_json::to_string(&set.quiz.questions)
            .map_err(|e| (Artifact::Quiz, StoreError::Decode(e.to_string())))?;
        let quiz = self
            .store
            .insert_quiz(NewQuiz {
                title: set.quiz.title.clone(),
                description: Some(set.quiz.description.clone()),
                topic_id: Some(topic_id.to_string()),
                grade: Some(grade),
                difficulty: Some(set.quiz.difficulty.to_string()),
                questions,
                user_id: Some(user_id.to_string()),
                is_ai_generated: true,
            })
            .await
            .map_err(|e| (Artifact::Quiz, e))?;
        written.push(Written::Quiz(quiz.id.clone()));

        let flashcards = serde_json::to_value(&set.flashcard_set.flashcards)
            .map_err(|e| (Artifact::FlashcardSet, StoreError::Decode(e.to_string())))?;
        let deck = self
            .store
            .insert_flashcard_set(NewFlashcardSet {
                title: set.flashcard_set.title.clone(),
                description: Some(set.flashcard_set.description.clone()),
                topic_id: Some(topic_id.to_string()),
                grade: Some(grade),
                user_id: Some(user_id.to_string()),
                is_ai_generated: true,
                flashcards,
            })
            .await
            .map_err(|e| (Artifact::FlashcardSet, e))?;
        written.push(Written::FlashcardSet(deck.id.clone()));

        let session = self
            .store
            .insert_learning_session(NewLearningSession {
                user_id: user_id.to_string(),
                topic_id: topic_id.to_string(),
                grade,
                content_id: content.id.clone(),
                quiz_id: quiz.id.clone(),
                flashcard_set_id: deck.id.clone(),
            })
            .await
            .map_err(|e| (Artifact::LearningSession, e))?;

        Ok(SavedLearningSession {
            session_id: session.id,
            content_id: content.id,
            quiz_id: quiz.id,
            flashcard_set_id: deck.id,
        })
    }

    /// Deletes written rows, newest first. Failures are logged only.
    async fn compensate(&self, written: Vec<Written>) {
        for row in written.into_iter().rev() {
            let (artifact, id, result) = match &row {
                Written::FlashcardSet(id) => (
                    Artifact::FlashcardSet,
                    id,
                    self.store.delete_flashcard_set(id).await,
                ),
                Written::Quiz(id) => (Artifact::Quiz, id, self.store.delete_quiz(id).await),
                Written::Content(id) => (
                    Artifact::EducationalContent,
                    id,
                    self.store.delete_content(id).await,
                ),
            };
            match result {
                Ok(_) => info!(%artifact, id = %id, "Removed orphaned row"),
                Err(e) => warn!(%artifact, id = %id, error = %e, "Failed to remove orphaned row"),
            }
        }
    }
}
