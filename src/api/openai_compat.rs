use crate::api::sse::sse_deltas;
use crate::api::{
    chat_body, extract_content, request_body, ApiError, ChatBackend, ChatMessage, ChatStream,
    Endpoint,
};
use crate::config::ProxyConfig;
use crate::constants::{CHAT_REQUEST_TIMEOUT, MODELS_REQUEST_TIMEOUT};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;

/// Client for an OpenAI-compatible local server (LM Studio) plus the proxy
/// agent that answers `/v1/agents`.
#[derive(Clone)]
pub struct LocalLlmClient {
    client: Client,
    lm_studio_url: String,
    proxy_agent_url: String,
    pub model: String,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl LocalLlmClient {
    pub fn new(config: &ProxyConfig, model: &str) -> Result<Self, ApiError> {
        Self::with_base_urls(
            config.lm_studio.base_url(),
            config.proxy_agent.base_url(),
            model,
        )
    }

    pub fn with_base_urls(
        lm_studio_url: impl Into<String>,
        proxy_agent_url: impl Into<String>,
        model: &str,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(CHAT_REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            lm_studio_url: lm_studio_url.into().trim_end_matches('/').to_string(),
            proxy_agent_url: proxy_agent_url.into().trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Agent requests go to the proxy; everything else to the model server.
    pub fn url_for(&self, endpoint: Endpoint) -> String {
        let base = match endpoint {
            Endpoint::Agent => &self.proxy_agent_url,
            _ => &self.lm_studio_url,
        };
        format!("{}{}", base, endpoint.path())
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Response, ApiError> {
        tracing::debug!("POST {}", url);
        let response = self.client.post(url).json(body).send().await?;
        check_status(response).await
    }

    async fn post_for_content(&self, url: &str, body: &Value) -> Result<String, ApiError> {
        let response = self.post(url, body).await?;
        let data: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Response(format!("Invalid JSON in response: {}", e)))?;
        Ok(extract_content(&data))
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!("Server returned {}: {}", status, body);
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ChatBackend for LocalLlmClient {
    fn name(&self) -> &str {
        "LM Studio"
    }

    async fn send(&self, endpoint: Endpoint, text: &str) -> Result<String, ApiError> {
        let body = request_body(endpoint, &self.model, text, false);
        self.post_for_content(&self.url_for(endpoint), &body).await
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ApiError> {
        let body = chat_body(&self.model, messages, false);
        self.post_for_content(&self.url_for(Endpoint::Chat), &body)
            .await
    }

    async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<ChatStream, ApiError> {
        let body = chat_body(&self.model, messages, true);
        let response = self.post(&self.url_for(Endpoint::Chat), &body).await?;
        Ok(sse_deltas(response.bytes_stream()))
    }

    async fn list_models(&self) -> Result<Vec<String>, ApiError> {
        let url = format!("{}/v1/models", self.lm_studio_url);
        let response = self
            .client
            .get(&url)
            .timeout(MODELS_REQUEST_TIMEOUT)
            .send()
            .await?;
        let list: ModelList = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Response(format!("Invalid model list: {}", e)))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{drain_stream, StopFlag};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves one canned HTTP response and hands back the raw request.
    async fn serve_once(
        status: &'static str,
        content_type: &'static str,
        body: String,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                content_type,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (base, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if data.len() >= head_end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    fn client(base: &str) -> LocalLlmClient {
        LocalLlmClient::with_base_urls(base, base, "test-model").unwrap()
    }

    #[test]
    fn test_url_routing() {
        let client =
            LocalLlmClient::with_base_urls("http://lm:1/", "http://agent:2", "m").unwrap();
        assert_eq!(
            client.url_for(Endpoint::Chat),
            "http://lm:1/v1/chat/completions"
        );
        assert_eq!(client.url_for(Endpoint::Agent), "http://agent:2/v1/agents");
        assert_eq!(client.url_for(Endpoint::Edit), "http://lm:1/v1/edits");
    }

    #[test]
    fn test_new_from_config() {
        let client = LocalLlmClient::new(&ProxyConfig::default(), "m").unwrap();
        assert_eq!(
            client.url_for(Endpoint::Completion),
            "http://127.0.0.1:7860/v1/completions"
        );
        assert_eq!(
            client.url_for(Endpoint::Agent),
            "http://localhost:3000/v1/agents"
        );
    }

    #[tokio::test]
    async fn test_chat_non_streaming() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"}}]}"#;
        let (base, server) = serve_once("200 OK", "application/json", body.to_string()).await;
        let reply = client(&base)
            .chat(&[ChatMessage::user("hello")])
            .await
            .unwrap();
        assert_eq!(reply, "Hi there");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/chat/completions"));
        assert!(request.contains("\"stream\":false"));
        assert!(request.contains("\"model\":\"test-model\""));
    }

    #[tokio::test]
    async fn test_send_completion_reads_text_shape() {
        let body = r#"{"choices":[{"text":"print(1)"}]}"#;
        let (base, server) = serve_once("200 OK", "application/json", body.to_string()).await;
        let reply = client(&base)
            .send(Endpoint::Completion, "pri")
            .await
            .unwrap();
        assert_eq!(reply, "print(1)");
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/completions"));
        assert!(request.contains("\"prompt\":\"pri\""));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let (base, _server) =
            serve_once("500 Internal Server Error", "text/plain", "model crashed".to_string())
                .await;
        let err = client(&base)
            .send(Endpoint::Agent, "q")
            .await
            .unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model crashed");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_chat_stream() {
        let body = [
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            "data: [DONE]",
            "",
        ]
        .join("\n\n");
        let (base, server) = serve_once("200 OK", "text/event-stream", body).await;
        let stream = client(&base)
            .chat_stream(&[ChatMessage::user("hi")])
            .await
            .unwrap();
        let outcome = drain_stream(stream, &StopFlag::new(), |_| {}).await.unwrap();
        assert_eq!(outcome.text, "Hello");
        assert!(!outcome.interrupted);
        assert!(server.await.unwrap().contains("\"stream\":true"));
    }

    #[tokio::test]
    async fn test_list_models() {
        let body = r#"{"object":"list","data":[{"id":"qwen"},{"id":"llama"}]}"#;
        let (base, server) = serve_once("200 OK", "application/json", body.to_string()).await;
        let models = client(&base).list_models().await.unwrap();
        assert_eq!(models, vec!["qwen", "llama"]);
        assert!(server.await.unwrap().starts_with("GET /v1/models"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let err = client(&base).list_models().await.unwrap_err();
        assert!(matches!(err, ApiError::HttpClient(_)));
    }
}
