use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub mod openai_compat;
pub mod sse;

pub use openai_compat::LocalLlmClient;

use crate::constants::{CHAT_MAX_TOKENS, COMPLETION_MAX_TOKENS, EDIT_INSTRUCTION};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("API response error: {0}")]
    Response(String),
    #[error("Stream error: {0}")]
    Stream(String),
}

/// The endpoints exposed by the local inference server and the proxy agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Chat,
    Agent,
    Edit,
    Completion,
}

impl Endpoint {
    pub const ALL: [Endpoint; 4] = [
        Endpoint::Chat,
        Endpoint::Agent,
        Endpoint::Edit,
        Endpoint::Completion,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Chat => "/v1/chat/completions",
            Endpoint::Agent => "/v1/agents",
            Endpoint::Edit => "/v1/edits",
            Endpoint::Completion => "/v1/completions",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Endpoint::Chat => "Chat",
            Endpoint::Agent => "Agent",
            Endpoint::Edit => "Edit",
            Endpoint::Completion => "Autocomplete",
        }
    }

    /// Only chat supports server-sent event streaming.
    pub fn supports_streaming(self) -> bool {
        self == Endpoint::Chat
    }
}

/// JSON body for a single-prompt request to `endpoint`.
pub fn request_body(endpoint: Endpoint, model: &str, text: &str, stream: bool) -> Value {
    match endpoint {
        Endpoint::Chat => chat_body(model, &[ChatMessage::user(text)], stream),
        Endpoint::Agent => json!({ "query": text }),
        Endpoint::Edit => json!({
            "model": model,
            "input": text,
            "instruction": EDIT_INSTRUCTION,
        }),
        Endpoint::Completion => json!({
            "model": model,
            "prompt": text,
            "max_tokens": COMPLETION_MAX_TOKENS,
        }),
    }
}

pub fn chat_body(model: &str, messages: &[ChatMessage], stream: bool) -> Value {
    json!({
        "model": model,
        "messages": messages,
        "max_tokens": CHAT_MAX_TOKENS,
        "stream": stream,
    })
}

/// Pulls the answer text out of any of the response shapes the servers use:
/// `choices[0].message.content`, `choices[0].text`, or a top-level
/// `response` / `content` / `text` / `answer`. Unknown shapes come back as
/// pretty-printed JSON so the user still sees something.
pub fn extract_content(data: &Value) -> String {
    if let Some(choice) = data.get("choices").and_then(|c| c.get(0)) {
        if let Some(content) = choice.pointer("/message/content").and_then(Value::as_str) {
            return content.to_string();
        }
        if let Some(text) = choice.get("text").and_then(Value::as_str) {
            return text.to_string();
        }
    }
    for key in ["response", "content", "text", "answer"] {
        if let Some(text) = data.get(key).and_then(Value::as_str) {
            return text.to_string();
        }
    }
    serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, ApiError>> + Send>>;

/// Cooperative cancellation flag, checked between streamed chunks.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub text: String,
    pub interrupted: bool,
}

/// Consumes `stream`, handing every delta to `on_delta`, until it ends or
/// `stop` is requested.
pub async fn drain_stream(
    mut stream: ChatStream,
    stop: &StopFlag,
    mut on_delta: impl FnMut(&str),
) -> Result<StreamOutcome, ApiError> {
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        if stop.is_requested() {
            tracing::info!("Streaming interrupted after {} chars", text.len());
            return Ok(StreamOutcome {
                text,
                interrupted: true,
            });
        }
        let delta = item?;
        on_delta(&delta);
        text.push_str(&delta);
    }
    Ok(StreamOutcome {
        text,
        interrupted: false,
    })
}

/// The seam between the UI and whatever server answers chat requests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;
    /// One prompt to one endpoint, answered in full.
    async fn send(&self, endpoint: Endpoint, text: &str) -> Result<String, ApiError>;
    /// A chat turn with prior context, answered in full.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ApiError>;
    /// A chat turn streamed as content deltas.
    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<ChatStream, ApiError>;
    async fn list_models(&self) -> Result<Vec<String>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_content_all_shapes_agree() {
        let answer = "def f():\n    return 1";
        let shapes = [
            json!({"choices": [{"message": {"role": "assistant", "content": answer}}]}),
            json!({"choices": [{"text": answer, "index": 0}]}),
            json!({"response": answer}),
            json!({"content": answer}),
            json!({"text": answer}),
            json!({"answer": answer}),
        ];
        for shape in &shapes {
            assert_eq!(extract_content(shape), answer, "shape: {}", shape);
        }
    }

    #[test]
    fn test_extract_content_unknown_shape() {
        let data = json!({"status": "ok"});
        assert_eq!(extract_content(&data), "{\n  \"status\": \"ok\"\n}");
    }

    #[test]
    fn test_request_bodies() {
        let chat = request_body(Endpoint::Chat, "m", "hi", true);
        assert_eq!(
            chat,
            json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
                "max_tokens": 4000,
                "stream": true
            })
        );
        assert_eq!(request_body(Endpoint::Agent, "m", "q", false), json!({"query": "q"}));
        let edit = request_body(Endpoint::Edit, "m", "x=1", false);
        assert_eq!(edit["input"], "x=1");
        assert_eq!(edit["instruction"], EDIT_INSTRUCTION);
        let completion = request_body(Endpoint::Completion, "m", "def", false);
        assert_eq!(completion["prompt"], "def");
        assert_eq!(completion["max_tokens"], 1000);
    }

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(Endpoint::Chat.path(), "/v1/chat/completions");
        assert_eq!(Endpoint::Agent.path(), "/v1/agents");
        assert_eq!(Endpoint::Edit.path(), "/v1/edits");
        assert_eq!(Endpoint::Completion.path(), "/v1/completions");
        assert!(Endpoint::Chat.supports_streaming());
        assert!(!Endpoint::Agent.supports_streaming());
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Status {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Server returned 500: boom");
    }

    #[tokio::test]
    async fn test_drain_stream_collects_deltas() {
        let stream: ChatStream = Box::pin(futures::stream::iter(vec![
            Ok("Hel".to_string()),
            Ok("lo".to_string()),
        ]));
        let mut seen = Vec::new();
        let outcome = drain_stream(stream, &StopFlag::new(), |d| seen.push(d.to_string()))
            .await
            .unwrap();
        assert_eq!(outcome.text, "Hello");
        assert!(!outcome.interrupted);
        assert_eq!(seen, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_drain_stream_honours_stop() {
        let stop = StopFlag::new();
        let stream: ChatStream = Box::pin(futures::stream::iter(vec![
            Ok("a".to_string()),
            Ok("b".to_string()),
            Ok("c".to_string()),
        ]));
        let flag = stop.clone();
        let outcome = drain_stream(stream, &stop, move |_| flag.request())
            .await
            .unwrap();
        assert_eq!(outcome.text, "a");
        assert!(outcome.interrupted);
    }

    #[tokio::test]
    async fn test_drain_stream_propagates_errors() {
        let stream: ChatStream = Box::pin(futures::stream::iter(vec![
            Ok("a".to_string()),
            Err(ApiError::Stream("cut".to_string())),
        ]));
        let err = drain_stream(stream, &StopFlag::new(), |_| {}).await.unwrap_err();
        assert!(matches!(err, ApiError::Stream(_)));
    }
}
