//! Integration tests for the HTTP surface: health, CORS, curriculum
//! administration and the tutor chat, over a real socket.

use std::sync::Arc;

use heritagepal_genai::{LlmErrorKind, ScriptedGenerator, TextGenerator};
use heritagepal_server::{create_router, AppState, Config};
use heritagepal_store::{MemoryStore, UserProfile};
use reqwest::{header, Client, Method, StatusCode};
use serde_json::{json, Value};

const ADMIN_TOKEN: &str = "admin-token";
const STUDENT_TOKEN: &str = "student-token";

async fn spawn_server(generator: Arc<dyn TextGenerator>) -> String {
    let store = Arc::new(MemoryStore::seeded());
    for (token, id, role) in [
        (ADMIN_TOKEN, "admin-1", "admin"),
        (STUDENT_TOKEN, "student-1", "user"),
    ] {
        store
            .register_token(
                token,
                UserProfile {
                    id: id.to_string(),
                    email: None,
                    name: None,
                    role: role.to_string(),
                },
            )
            .await;
    }

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

async fn call(
    client: &Client,
    method: Method,
    url: String,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = client.request(method, url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.expect("Request failed");
    let status = response.status();
    let body = response.json().await.unwrap_or(Value::Null);
    (status, body)
}

/// Tests the health endpoint.
#[tokio::test]
async fn test_health_check() {
    let base = spawn_server(Arc::new(ScriptedGenerator::new(""))).await;
    let (status, body) =
        call(&Client::new(), Method::GET, format!("{base}/healthz"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

/// Tests that only configured origins get CORS headers.
#[tokio::test]
async fn test_cors_allows_frontend_origin_only() {
    let base = spawn_server(Arc::new(ScriptedGenerator::new(""))).await;
    let client = Client::new();

    let preflight = |origin: &'static str| {
        client
            .request(Method::OPTIONS, format!("{base}/api/topics"))
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization,content-type")
            .send()
    };

    let allowed = preflight("http://localhost:3050").await.expect("Request failed");
    assert_eq!(
        allowed.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).map(|v| v.as_bytes()),
        Some(b"http://localhost:3050".as_slice())
    );
    assert_eq!(
        allowed
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .map(|v| v.as_bytes()),
        Some(b"true".as_slice())
    );

    let denied = preflight("http://evil.example").await.expect("Request failed");
    assert!(denied.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

/// Tests creating a topic, assigning it to a grade and reading it back.
#[tokio::test]
async fn test_admin_curriculum_workflow() {
    let base = spawn_server(Arc::new(ScriptedGenerator::new(""))).await;
    let client = Client::new();

    let (status, body) = call(
        &client,
        Method::POST,
        format!("{base}/api/topics"),
        Some(STUDENT_TOKEN),
        Some(json!({"title": "Rivers", "content": "The Essequibo is the longest river."})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Not authorized as an admin");

    let (status, topic) = call(
        &client,
        Method::POST,
        format!("{base}/api/topics"),
        Some(ADMIN_TOKEN),
        Some(json!({"title": "Rivers", "content": "The Essequibo is the longest river."})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let topic_id = topic["id"].as_str().expect("topic id missing").to_string();

    let (_, grades) = call(&client, Method::GET, format!("{base}/api/grades"), None, None).await;
    let grade_two = grades
        .as_array()
        .and_then(|g| g.iter().find(|g| g["level"] == 2))
        .and_then(|g| g["id"].as_str())
        .expect("grade 2 missing")
        .to_string();

    let assignment = json!({"grade_id": grade_two, "topic_id": topic_id});
    let (status, _) = call(
        &client,
        Method::POST,
        format!("{base}/api/grades/topic-assignment"),
        Some(ADMIN_TOKEN),
        Some(assignment.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &client,
        Method::POST,
        format!("{base}/api/grades/topic-assignment"),
        Some(ADMIN_TOKEN),
        Some(assignment),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Topic is already assigned to this grade");

    let (status, topics) = call(
        &client,
        Method::GET,
        format!("{base}/api/grades/{grade_two}/topics"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(topics
        .as_array()
        .expect("topics not an array")
        .iter()
        .any(|t| t["id"] == topic_id.as_str()));

    let (status, body) = call(
        &client,
        Method::DELETE,
        format!("{base}/api/topics/{topic_id}"),
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Topic deleted successfully");

    let url = format!("{base}/api/topics/{topic_id}");
    let (status, _) = call(&client, Method::GET, url, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Tests a chat conversation and the apology on service failure.
#[tokio::test]
async fn test_chat_conversation() {
    let base = spawn_server(Arc::new(
        ScriptedGenerator::new("Kaieteur Falls is on the Potaro River.")
            .fail_on("Student's question: break", LlmErrorKind::RateLimit),
    ))
    .await;
    let client = Client::new();

    let (status, reply) = call(
        &client,
        Method::POST,
        format!("{base}/api/chat/message"),
        Some(STUDENT_TOKEN),
        Some(json!({"message": "Where is Kaieteur Falls?", "grade": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["message"], "Kaieteur Falls is on the Potaro River.");
    let session_id = reply["sessionId"].as_str().expect("sessionId missing").to_string();

    let (status, reply) = call(
        &client,
        Method::POST,
        format!("{base}/api/chat/message"),
        Some(STUDENT_TOKEN),
        Some(json!({"message": "break", "sessionId": session_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(reply["message"]
        .as_str()
        .expect("message missing")
        .starts_with("I'm sorry"));

    let (_, history) = call(
        &client,
        Method::GET,
        format!("{base}/api/chat/history/{session_id}"),
        None,
        None,
    )
    .await;
    assert_eq!(history.as_array().map(Vec::len), Some(4));

    let (status, sessions) = call(
        &client,
        Method::GET,
        format!("{base}/api/chat/history"),
        Some(STUDENT_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sessions[0]["session_id"], session_id.as_str());
}
