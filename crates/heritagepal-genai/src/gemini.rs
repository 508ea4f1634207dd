//! Gemini REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{GenerationError, LlmErrorKind, Result, TextGenerator};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Header carrying the API key; keeps the key out of URLs and their error text.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Creates a client for `model` authenticated with `api_key`.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GenerationError::api(LlmErrorKind::Other, e.to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Points the client at a different API host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl GenerateResponse {
    /// Concatenates the text parts of the first candidate.
    fn into_text(self) -> Option<String> {
        let parts = self.candidates.into_iter().next()?.content?.parts;
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Maps an HTTP failure to an error kind.
fn classify(status: StatusCode, message: &str) -> LlmErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmErrorKind::Authentication,
        StatusCode::BAD_REQUEST if message.to_lowercase().contains("api key") => {
            LlmErrorKind::Authentication
        }
        StatusCode::TOO_MANY_REQUESTS => LlmErrorKind::RateLimit,
        s if s.is_server_error() => LlmErrorKind::Server,
        _ => LlmErrorKind::Other,
    }
}

/// Converts a transport failure without the request URL.
fn transport_error(e: reqwest::Error) -> GenerationError {
    GenerationError::api(LlmErrorKind::Network, e.without_url().to_string())
}

fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, prompt_len = prompt.len(), "Calling Gemini");

        let request = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        let response = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let message = error_message(status, &body);
            let kind = classify(status, &message);
            warn!(status = %status, kind = %kind, "Gemini request failed");
            return Err(GenerationError::api(kind, message));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::api(LlmErrorKind::Other, e.to_string()))?;
        parsed.into_text().ok_or(GenerationError::EmptyResponse)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let client = GeminiClient::new("key", DEFAULT_MODEL)
            .unwrap()
            .with_base_url("http://localhost:9999/");
        assert_eq!(
            client.endpoint(),
            "http://localhost:9999/v1beta/models/gemini-2.0-flash-lite:generateContent"
        );
        assert_eq!(client.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_transport_error_hides_api_key() {
        let client = GeminiClient::new("SECRET-KEY-123", DEFAULT_MODEL)
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        let err = tokio_test::block_on(client.generate("hello")).unwrap_err();
        assert_eq!(err.kind(), LlmErrorKind::Network);
        assert!(!err.to_string().contains("SECRET-KEY-123"));
        assert!(!format!("{err:?}").contains("SECRET-KEY-123"));
        assert!(!format!("{client:?}").contains("SECRET-KEY-123"));
    }

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            contents: [Content {
                parts: [Part { text: "hello" }],
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"contents": [{"parts": [{"text": "hello"}]}]})
        );
    }

    #[test]
    fn test_response_text_joins_parts() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Guyana is "}, {"text": "in South America."}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.into_text().as_deref(),
            Some("Guyana is in South America.")
        );
    }

    #[test]
    fn test_response_without_candidates() {
        let parsed: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(parsed.into_text().is_none());
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, "API key not valid. Please pass a valid API key."),
            LlmErrorKind::Authentication
        );
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, "Invalid JSON payload"),
            LlmErrorKind::Other
        );
        assert_eq!(
            classify(StatusCode::FORBIDDEN, ""),
            LlmErrorKind::Authentication
        );
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS, ""),
            LlmErrorKind::RateLimit
        );
        assert_eq!(
            classify(StatusCode::SERVICE_UNAVAILABLE, ""),
            LlmErrorKind::Server
        );
    }

    #[test]
    fn test_error_message_from_body() {
        let body = r#"{"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            error_message(StatusCode::TOO_MANY_REQUESTS, body),
            "Resource has been exhausted"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>"),
            "HTTP 502 Bad Gateway"
        );
    }
}
