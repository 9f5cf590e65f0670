//! Completion backend trait and the OpenAI-compatible chat-completions client.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Config;

/// Error type for completion calls, distinguishing rate limiting from other errors.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Server returned 429 Too Many Requests.
    #[error("rate limited (429): {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },
    /// Non-success HTTP status other than 429.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    /// Transport-level failure (connect, timeout, body decode).
    #[error("HTTP request error: {0}")]
    Http(String),
    #[error("completion response contained no message content")]
    EmptyResponse,
    #[error("no API key configured (set GROQ_API_KEY)")]
    MissingApiKey,
}

impl LlmError {
    /// Whether the failure signals throttling and is worth retrying.
    ///
    /// Besides a proper 429, some gateways wrap the provider's
    /// `rate_limit_exceeded` code inside another status, so the message text
    /// is checked as well.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            other => other.to_string().to_lowercase().contains("rate_limit"),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Http(e.to_string())
    }
}

/// A text-generation service that turns one prompt into one reply.
pub trait CompletionBackend: Send + Sync {
    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Send a single-message prompt and return the raw reply text.
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: [ChatMessage<'a>; 1],
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint (Groq by default).
pub struct ChatCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl std::fmt::Debug for ChatCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ChatCompletionClient {
    /// Build a client from resolved configuration.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn send(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let retry_after = rate_limit_retry_after(&resp);
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await;
            return Err(error_from_response(status.as_u16(), retry_after, body));
        }

        let body: ChatResponse = resp.json().await?;
        extract_content(body)
    }
}

fn extract_content(body: ChatResponse) -> Result<String, LlmError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(LlmError::EmptyResponse)
}

impl CompletionBackend for ChatCompletionClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        Box::pin(self.send(prompt))
    }
}

/// Build the error for a non-success response. An unreadable body is
/// described in the message rather than dropped.
fn error_from_response<E: std::fmt::Display>(
    status: u16,
    retry_after: Option<Option<Duration>>,
    body: Result<String, E>,
) -> LlmError {
    let message = body.unwrap_or_else(|e| format!("failed to read error body: {e}"));
    match retry_after {
        Some(retry_after) => LlmError::RateLimited {
            retry_after,
            message,
        },
        None => LlmError::Api { status, message },
    }
}

/// If the response is a 429, return `Some(retry_after)` parsed from the header.
///
/// The outer `Option` says whether the response was rate limited at all.
pub fn rate_limit_retry_after(resp: &reqwest::Response) -> Option<Option<Duration>> {
    if resp.status().as_u16() != 429 {
        return None;
    }
    Some(
        resp.headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after),
    )
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date form: use a conservative fallback instead of parsing the date
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_variant_is_rate_limit() {
        let err = LlmError::RateLimited {
            retry_after: None,
            message: String::new(),
        };
        assert!(err.is_rate_limit());
    }

    #[test]
    fn rate_limit_code_in_message_is_rate_limit() {
        let err = LlmError::Api {
            status: 503,
            message: r#"{"error":{"code":"rate_limit_exceeded"}}"#.into(),
        };
        assert!(err.is_rate_limit());

        let err = LlmError::Http("upstream said RATE_LIMIT reached".into());
        assert!(err.is_rate_limit());
    }

    #[test]
    fn other_errors_are_not_rate_limit() {
        assert!(
            !LlmError::Api {
                status: 401,
                message: "invalid api key".into()
            }
            .is_rate_limit()
        );
        assert!(!LlmError::Http("connection refused".into()).is_rate_limit());
        assert!(!LlmError::EmptyResponse.is_rate_limit());
    }

    #[test]
    fn parse_integer_seconds() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
    }

    #[test]
    fn parse_http_date_falls_back() {
        let val = "Wed, 21 Oct 2015 07:28:00 GMT";
        assert_eq!(parse_retry_after(val), Some(Duration::from_secs(5)));
    }

    #[test]
    fn parse_garbage_none() {
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn not_rate_limited_on_200() {
        let http_resp = http::Response::builder().status(200).body("").unwrap();
        let resp = reqwest::Response::from(http_resp);
        assert_eq!(rate_limit_retry_after(&resp), None);
    }

    #[test]
    fn rate_limited_429_with_header() {
        let http_resp = http::Response::builder()
            .status(429)
            .header("retry-after", "12")
            .body("")
            .unwrap();
        let resp = reqwest::Response::from(http_resp);
        assert_eq!(
            rate_limit_retry_after(&resp),
            Some(Some(Duration::from_secs(12)))
        );
    }

    #[test]
    fn rate_limited_429_no_header() {
        let http_resp = http::Response::builder().status(429).body("").unwrap();
        let resp = reqwest::Response::from(http_resp);
        assert_eq!(rate_limit_retry_after(&resp), Some(None));
    }

    #[test]
    fn error_body_is_kept_in_message() {
        let err = error_from_response::<&str>(
            503,
            None,
            Ok(r#"{"error":{"code":"rate_limit_exceeded"}}"#.into()),
        );
        assert!(matches!(err, LlmError::Api { status: 503, .. }));
        assert!(err.is_rate_limit());

        let err = error_from_response::<&str>(
            429,
            Some(Some(Duration::from_secs(3))),
            Ok(String::new()),
        );
        assert!(matches!(
            err,
            LlmError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(3)
        ));
    }

    #[test]
    fn unreadable_error_body_is_reported() {
        let err = error_from_response(500, None, Err("connection reset"));
        let LlmError::Api { status, message } = &err else {
            panic!("expected API error, got {err:?}");
        };
        assert_eq!(*status, 500);
        assert_eq!(message, "failed to read error body: connection reset");
        assert!(!err.is_rate_limit());
    }

    #[tokio::test]
    async fn body_of_built_response_reaches_error() {
        let http_resp = http::Response::builder()
            .status(502)
            .body("gateway: rate_limit_exceeded")
            .unwrap();
        let resp = reqwest::Response::from(http_resp);
        let retry_after = rate_limit_retry_after(&resp);
        let status = resp.status().as_u16();
        let err = error_from_response(status, retry_after, resp.text().await);
        assert!(matches!(err, LlmError::Api { status: 502, .. }));
        assert!(err.is_rate_limit());
    }

    #[test]
    fn content_of_first_choice() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"node\":{}}"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_content(body).unwrap(), "{\"node\":{}}");
    }

    #[test]
    fn empty_choices_is_error() {
        let body: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(extract_content(body), Err(LlmError::EmptyResponse)));
    }

    #[test]
    fn missing_key_is_error() {
        let config = Config::default();
        assert!(matches!(
            ChatCompletionClient::from_config(&config),
            Err(LlmError::MissingApiKey)
        ));
    }

    #[test]
    fn request_shape() {
        let request = ChatRequest {
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
            model: "llama-3.3-70b-versatile",
            temperature: 0.1,
            max_tokens: 2048,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["model"], "llama-3.3-70b-versatile");
        assert_eq!(value["max_tokens"], 2048);
    }
}
