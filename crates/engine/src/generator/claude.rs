//! Anthropic Messages API client.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::generator::GeneratorError;
use crate::ports::{GenerateRequest, GeneratorPort};

/// Default Anthropic API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";

const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    default_max_tokens: u32,
    default_temperature: f32,
}

impl ClaudeClient {
    pub fn new(
        api_key: &str,
        model: &str,
        default_max_tokens: u32,
        default_temperature: f32,
    ) -> Self {
        Self::with_base_url(
            DEFAULT_API_BASE_URL,
            api_key,
            model,
            default_max_tokens,
            default_temperature,
        )
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_base_url(
        base_url: &str,
        api_key: &str,
        model: &str,
        default_max_tokens: u32,
        default_temperature: f32,
    ) -> Self {
        // LLM requests can be slow; allow two minutes before giving up.
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            default_max_tokens,
            default_temperature,
        }
    }

    fn build_body(&self, request: &GenerateRequest, stream: bool) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(self.default_max_tokens),
            temperature: request.temperature.unwrap_or(self.default_temperature),
            system: if request.system.is_empty() {
                None
            } else {
                Some(request.system.clone())
            },
            messages: vec![Message {
                role: "user".to_string(),
                content: request.user.clone(),
            }],
            stream: if stream { Some(true) } else { None },
        }
    }

    async fn post(
        &self,
        body: &MessagesRequest,
    ) -> Result<reqwest::Response, GeneratorError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| GeneratorError::Request(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(GeneratorError::RateLimited);
        }
        if status.is_server_error() {
            return Err(GeneratorError::Server(status.as_u16()));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Request(format!("HTTP {status}: {detail}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl GeneratorPort for ClaudeClient {
    async fn generate(&self, request: GenerateRequest) -> Result<String, GeneratorError> {
        let body = self.build_body(&request, false);
        let response = self.post(&body).await?;

        let api_response: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;

        api_response
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| {
                GeneratorError::InvalidResponse("no text block in response".to_string())
            })
    }

    async fn generate_streaming(
        &self,
        request: GenerateRequest,
    ) -> Result<BoxStream<'static, Result<String, GeneratorError>>, GeneratorError> {
        let body = self.build_body(&request, true);
        let response = self.post(&body).await?;

        // Server-sent events: accumulate bytes, split on blank lines, and
        // surface content_block_delta text chunks.
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| GeneratorError::Request(e.to_string())))
            .scan(String::new(), |buffer, chunk| {
                let chunks = match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        let mut out = Vec::new();
                        while let Some(pos) = buffer.find("\n\n") {
                            let event: String = buffer.drain(..pos + 2).collect();
                            if let Some(text) = parse_sse_event(&event) {
                                out.push(Ok(text));
                            }
                        }
                        out
                    }
                    Err(err) => vec![Err(err)],
                };
                futures_util::future::ready(Some(futures_util::stream::iter(chunks)))
            })
            .flatten();

        Ok(stream.boxed())
    }
}

/// Extract delta text from one SSE event block, if it carries any.
fn parse_sse_event(event: &str) -> Option<String> {
    let data = event
        .lines()
        .find_map(|line| line.strip_prefix("data: "))?;
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    if value.get("type")?.as_str()? != "content_block_delta" {
        return None;
    }
    value
        .get("delta")?
        .get("text")?
        .as_str()
        .map(str::to_string)
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_event_with_delta_text_is_extracted() {
        let event = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Once\"}}\n\n";
        assert_eq!(parse_sse_event(event), Some("Once".to_string()));
    }

    #[test]
    fn sse_event_without_delta_is_skipped() {
        let event = "event: message_start\ndata: {\"type\":\"message_start\"}\n\n";
        assert_eq!(parse_sse_event(event), None);
    }

    #[test]
    fn request_body_uses_defaults_when_unset() {
        let client = ClaudeClient::new("key", "model-x", 1234, 0.7);
        let body = client.build_body(&GenerateRequest::default(), false);
        assert_eq!(body.max_tokens, 1234);
        assert!((body.temperature - 0.7).abs() < f32::EPSILON);
        assert!(body.system.is_none());
        assert!(body.stream.is_none());
    }
}
