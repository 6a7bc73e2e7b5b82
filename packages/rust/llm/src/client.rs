//! OpenAI-compatible streaming chat client.

use async_trait::async_trait;
use courtscout_shared::{CourtScoutError, Result};
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::sse::SseFragments;
use crate::{ChatMessage, ChatModel, ChatRequest, FragmentStream};

/// Request body for `POST {base_url}/chat/completions`.
#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream_options: StreamOptions,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    enable_search: bool,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

impl<'a> From<&'a ChatRequest> for WireRequest<'a> {
    fn from(request: &'a ChatRequest) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            stream: true,
            response_format: request
                .json_output
                .then_some(ResponseFormat { kind: "json_object" }),
            stream_options: StreamOptions {
                include_usage: true,
            },
            enable_search: request.enable_search,
        }
    }
}

/// Chat client for any endpoint speaking the OpenAI chat-completions protocol.
///
/// No overall request timeout is set on the HTTP client; callers bound each
/// call with [`crate::complete`].
pub struct OpenAiCompatClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CourtScoutError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    async fn stream_chat(&self, request: &ChatRequest) -> Result<FragmentStream> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            enable_search = request.enable_search,
            "sending chat request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&WireRequest::from(request))
            .send()
            .await
            .map_err(|e| CourtScoutError::transient(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CourtScoutError::transient(format!(
                "{}: HTTP {status}: {}",
                self.endpoint,
                body.chars().take(200).collect::<String>()
            )));
        }

        Ok(SseFragments::new(response.bytes_stream()).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Role, accumulate};
    use serde_json::json;

    fn request(enable_search: bool) -> ChatRequest {
        ChatRequest {
            model: "qwen-plus".into(),
            messages: vec![
                ChatMessage::system("find courts"),
                ChatMessage::user("临平区"),
            ],
            json_output: true,
            enable_search,
        }
    }

    #[test]
    fn wire_request_shape() {
        let req = request(true);
        let body = serde_json::to_value(WireRequest::from(&req)).unwrap();
        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
        assert_eq!(body["stream_options"], json!({"include_usage": true}));
        assert_eq!(body["enable_search"], json!(true));
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "find courts"}));

        let plain = ChatRequest {
            json_output: false,
            ..request(false)
        };
        let body = serde_json::to_value(WireRequest::from(&plain)).unwrap();
        assert!(body.get("enable_search").is_none());
        assert!(body.get("response_format").is_none());
        assert_eq!(plain.messages[1].role, Role::User);
    }

    #[tokio::test]
    async fn streams_completion_from_server() {
        let server = wiremock::MockServer::start().await;

        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"[{\\\"success\\\":\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"true}]\"}}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":10}}\n\n",
            "data: [DONE]\n\n",
        );

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/chat/completions"))
            .and(wiremock::matchers::header("authorization", "Bearer test-key"))
            .and(wiremock::matchers::body_partial_json(json!({
                "model": "qwen-plus",
                "stream": true,
                "enable_search": true
            })))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new(&format!("{}/v1/", server.uri()), "test-key").unwrap();
        let stream = client.stream_chat(&request(true)).await.unwrap();
        let text = accumulate(stream).await.unwrap();
        assert_eq!(text, "[{\"success\":true}]");
    }

    #[tokio::test]
    async fn http_error_is_transient() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::new(&server.uri(), "k").unwrap();
        let err = client.stream_chat(&request(false)).await.err().unwrap();
        assert!(matches!(err, CourtScoutError::TransientFetch(ref m) if m.contains("429")));
    }
}
