//! End-to-end tests for the learning-session workflow.
//!
//! A real server is bound to an ephemeral port with a seeded in-memory
//! store, and driven over HTTP: generate a learning session, fetch and
//! submit its quiz, then read it back from the learning history.

use std::sync::Arc;
use std::time::Duration;

use heritagepal_genai::{OfflineGenerator, ScriptedGenerator, TextGenerator};
use heritagepal_server::{create_router, AppState, Config};
use heritagepal_store::{MemoryStore, Store, Table, UserProfile};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const TOKEN: &str = "asha-token";

const QUIZ_JSON: &str = r#"```json
[
  {"question_text": "Which festival celebrates Guyana becoming a republic?",
   "options": ["Mashramani", "Diwali", "Phagwah", "Christmas"], "correct_answer": 0,
   "explanation": "Mashramani is held on 23 February.", "topic": "Guyanese Culture",
   "difficulty": "medium"},
  {"question_text": "Guyana is known as the land of how many peoples?",
   "options": ["Three", "Four", "Six", "Ten"], "correct_answer": 2,
   "explanation": "The Land of Six Peoples.", "topic": "Guyanese Culture",
   "difficulty": "easy"}
]
```"#;

const CARDS_JSON: &str = r#"[
  {"term": "Mashramani", "definition": "A festival celebrating Republic Day",
   "example": "Costume bands parade in Georgetown.", "topic": "Guyanese Culture", "grade": 3},
  {"term": "Phagwah", "definition": "The Hindu spring festival of colours",
   "topic": "Guyanese Culture", "grade": 3}
]"#;

/// Spawns the server and returns its base URL.
async fn spawn_server(store: Arc<MemoryStore>, generator: Arc<dyn TextGenerator>) -> String {
    let router = create_router(AppState::new(Config::default(), store, generator));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    format!("http://{addr}")
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::seeded());
    store
        .register_token(
            TOKEN,
            UserProfile {
                id: "asha".to_string(),
                email: Some("asha@example.gy".to_string()),
                name: Some("Asha".to_string()),
                role: "user".to_string(),
            },
        )
        .await;
    store
}

async fn topic_id(client: &Client, base: &str, title: &str) -> String {
    let topics: Vec<Value> = client
        .get(format!("{base}/api/topics"))
        .send()
        .await
        .expect("Failed to list topics")
        .json()
        .await
        .expect("Invalid topics body");
    topics
        .iter()
        .find(|t| t["title"] == title)
        .and_then(|t| t["id"].as_str())
        .map(str::to_string)
        .expect("Seeded topic missing")
}

async fn create_session(
    client: &Client,
    base: &str,
    topic: &str,
    grade: Value,
) -> (StatusCode, Value) {
    let response = client
        .post(format!("{base}/api/users/learning-session"))
        .bearer_auth(TOKEN)
        .json(&json!({ "topic_id": topic, "grade": grade }))
        .send()
        .await
        .expect("Request failed");
    let status = response.status();
    (status, response.json().await.expect("Invalid body"))
}

/// Tests the full session lifecycle against generated output.
#[tokio::test]
async fn test_learning_session_lifecycle() {
    let store = seeded_store().await;
    let generator = Arc::new(
        ScriptedGenerator::new("Guyana celebrates many festivals from its six peoples.")
            .respond_to("multiple-choice questions about", QUIZ_JSON)
            .respond_to("flashcards about", CARDS_JSON),
    );
    let base = spawn_server(store.clone(), generator.clone()).await;
    let client = Client::new();

    let topic = topic_id(&client, &base, "Guyanese Culture").await;
    let (status, session) = create_session(&client, &base, &topic, json!(3)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["topic"], "Guyanese Culture");
    assert_eq!(generator.call_count().await, 3);

    // The stored quiz comes back with the parsed questions.
    let quiz_id = session["quiz_id"].as_str().expect("quiz_id missing");
    let quiz: Value = client
        .get(format!("{base}/api/quizzes/{quiz_id}"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid body");
    let questions: Value =
        serde_json::from_str(quiz["questions"].as_str().expect("questions missing"))
            .expect("questions are not JSON");
    assert_eq!(questions.as_array().map(Vec::len), Some(2));
    assert_eq!(questions[0]["options"][0], "Mashramani");

    // One right, one wrong.
    let response = client
        .post(format!("{base}/api/quizzes/{quiz_id}/submit"))
        .bearer_auth(TOKEN)
        .json(&json!({ "answers": [0, 1] }))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::OK);
    let score: Value = response.json().await.expect("Invalid body");
    assert_eq!(score["totalQuestions"], 2);
    assert_eq!(score["correctCount"], 1);
    assert_eq!(score["percentage"], 50);
    assert_eq!(score["results"][1]["isCorrect"], false);

    // The result row is written in the background.
    let mut recorded = 0;
    for _ in 0..50 {
        recorded = store.row_count(Table::QuizResults).await;
        if recorded > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(recorded, 1);

    let deck_id = session["flashcard_set_id"].as_str().expect("deck id missing");
    let deck: Value = client
        .get(format!("{base}/api/flashcards/set/{deck_id}"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid body");
    assert_eq!(deck["flashcards"][0]["term"], "Mashramani");
    assert_eq!(deck["user_id"], "asha");

    let history: Value = client
        .get(format!("{base}/api/users/learning-history"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid body");
    assert_eq!(history[0]["id"], session["session_id"]);
    assert_eq!(history[0]["topics"]["title"], "Guyanese Culture");
    assert_eq!(history[0]["flashcard_sets"]["id"], session["flashcard_set_id"]);
}

/// Tests that a server without credentials still completes a session.
#[tokio::test]
async fn test_offline_generator_uses_fallback_set() {
    let store = seeded_store().await;
    let base = spawn_server(store.clone(), Arc::new(OfflineGenerator)).await;
    let client = Client::new();

    let topic = topic_id(&client, &base, "Natural Resources").await;
    let (status, session) = create_session(&client, &base, &topic, json!("4")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["grade"], 4);

    let quiz = store
        .get_quiz(session["quiz_id"].as_str().expect("quiz_id missing"))
        .await
        .expect("Store failed")
        .expect("Quiz missing");
    assert!(quiz.questions.contains("What is the capital city of Guyana?"));

    let deck = store
        .get_flashcard_set(session["flashcard_set_id"].as_str().expect("deck id missing"))
        .await
        .expect("Store failed")
        .expect("Deck missing");
    assert_eq!(deck.flashcards.as_array().map(Vec::len), Some(3));
}

/// Tests that rejected sessions leave no rows behind.
#[tokio::test]
async fn test_rejected_sessions_write_nothing() {
    let store = seeded_store().await;
    let generator = Arc::new(ScriptedGenerator::new("unused"));
    let base = spawn_server(store.clone(), generator.clone()).await;
    let client = Client::new();
    let topic = topic_id(&client, &base, "Guyanese Culture").await;

    for grade in [json!(0), json!(7), json!("abc")] {
        let (status, _) = create_session(&client, &base, &topic, grade).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    store.reject_inserts_into(Table::UserLearningSessions).await;
    let (status, body) = create_session(&client, &base, &topic, json!(3)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());

    assert_eq!(generator.call_count().await, 3);
    for table in [
        Table::EducationalContent,
        Table::Quizzes,
        Table::FlashcardSets,
        Table::UserLearningSessions,
    ] {
        assert_eq!(store.row_count(table).await, 0, "{table} not empty");
    }
}
