//! Generator: the abstract structured-text service every AI feature goes
//! through.
//!
//! `Generator` wraps a `GeneratorPort` (the vendor client) and layers on the
//! behavior services rely on: lenient JSON extraction, transient-error
//! retry, and streaming. Parse failures never abort a unit-of-work - they
//! degrade to a sentinel map the services know how to handle.

mod claude;

pub use claude::ClaudeClient;

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::BoxStream;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ports::{GenerateRequest, GeneratorPort};

/// Errors from the generator boundary
#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    /// Vendor rate limit - transient
    #[error("Generator rate limited")]
    RateLimited,
    /// Vendor 5xx - transient
    #[error("Generator server error: HTTP {0}")]
    Server(u16),
    /// Request could not be sent or timed out
    #[error("Generator request failed: {0}")]
    Request(String),
    /// Response body did not have the expected shape
    #[error("Invalid generator response: {0}")]
    InvalidResponse(String),
    /// Retries exhausted on transient failures
    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

impl GeneratorError {
    /// Transient errors are worth retrying; everything else propagates
    /// immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Server(_) | Self::Request(_))
    }
}

/// Key set on the sentinel map when JSON extraction failed entirely.
pub const PARSE_ERROR_KEY: &str = "_parse_error";

const JSON_ONLY_INSTRUCTION: &str = "\n\nIMPORTANT: Respond ONLY with valid JSON. \
Do not include any text before or after the JSON object. \
Do not use markdown code blocks.";

/// Vendor-agnostic generator facade. Cloning is cheap; the port is shared.
#[derive(Clone)]
pub struct Generator {
    port: Arc<dyn GeneratorPort>,
    max_retries: u32,
}

impl Generator {
    pub fn new(port: Arc<dyn GeneratorPort>, max_retries: u32) -> Self {
        Self { port, max_retries }
    }

    fn request(
        system: &str,
        user: &str,
        context: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> GenerateRequest {
        let system = if context.is_empty() {
            system.to_string()
        } else {
            format!("{system}\n\nADDITIONAL CONTEXT:\n{context}")
        };
        GenerateRequest {
            system,
            user: user.to_string(),
            temperature,
            max_tokens,
        }
    }

    /// Single text generation request.
    pub async fn generate(
        &self,
        system: &str,
        user: &str,
        context: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String, GeneratorError> {
        self.port
            .generate(Self::request(system, user, context, temperature, max_tokens))
            .await
    }

    /// Generation with retry on transient failures only. Exhaustion maps to
    /// `Unavailable`.
    pub async fn generate_with_retry(
        &self,
        system: &str,
        user: &str,
        context: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String, GeneratorError> {
        let request = Self::request(system, user, context, temperature, max_tokens);
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            match self.port.generate(request.clone()).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        error = %err,
                        "transient generator failure, retrying"
                    );
                    last_error = Some(err);
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }

        let detail = last_error.map_or_else(|| "retries exhausted".to_string(), |e| e.to_string());
        Err(GeneratorError::Unavailable(detail))
    }

    /// Structured generation: append the JSON-only instruction, then extract
    /// a JSON object leniently. Never fails on parse - total extraction
    /// failure yields the sentinel map so callers can degrade gracefully.
    pub async fn generate_structured(
        &self,
        system: &str,
        user: &str,
        context: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<Map<String, Value>, GeneratorError> {
        let user = format!("{user}{JSON_ONLY_INSTRUCTION}");
        let response = self
            .generate_with_retry(system, &user, context, temperature, max_tokens)
            .await?;
        Ok(parse_json_response(&response))
    }

    /// Streaming generation: text chunks as a lazy finite sequence.
    pub async fn generate_streaming(
        &self,
        system: &str,
        user: &str,
        context: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<BoxStream<'static, Result<String, GeneratorError>>, GeneratorError> {
        self.port
            .generate_streaming(Self::request(system, user, context, temperature, max_tokens))
            .await
    }
}

/// Lenient JSON extraction ladder: raw parse, fenced block, widest balanced
/// braces, then the sentinel fallback.
pub fn parse_json_response(response: &str) -> Map<String, Value> {
    if let Some(map) = try_parse_object(response.trim()) {
        return map;
    }

    if let Some(fenced) = extract_fenced_block(response) {
        if let Some(map) = try_parse_object(fenced.trim()) {
            return map;
        }
    }

    if let Some(braced) = extract_braced_substring(response) {
        if let Some(map) = try_parse_object(braced) {
            return map;
        }
    }

    let preview: String = response.chars().take(200).collect();
    tracing::warn!(%preview, "failed to parse structured generator response");
    let mut sentinel = Map::new();
    sentinel.insert("narrative".to_string(), Value::String(response.to_string()));
    sentinel.insert("choices".to_string(), Value::Null);
    sentinel.insert("mood".to_string(), Value::String("neutral".to_string()));
    sentinel.insert("new_entities".to_string(), Value::Array(Vec::new()));
    sentinel.insert("knowledge_updates".to_string(), Value::Array(Vec::new()));
    sentinel.insert("xp_awarded".to_string(), Value::Null);
    sentinel.insert(PARSE_ERROR_KEY.to_string(), Value::Bool(true));
    sentinel
}

fn try_parse_object(input: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(input) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Content of the first ``` fenced block, tolerating a language tag.
fn extract_fenced_block(input: &str) -> Option<&str> {
    let start = input.find("```")?;
    let after_fence = &input[start + 3..];
    let body_start = after_fence.find('\n').map_or(0, |pos| pos + 1);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// The widest substring spanning the first '{' to the last '}'.
fn extract_braced_substring(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&input[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockGeneratorPort;

    fn generator_with(port: MockGeneratorPort) -> Generator {
        Generator::new(Arc::new(port), 3)
    }

    #[tokio::test]
    async fn structured_parses_raw_json() {
        let mut port = MockGeneratorPort::new();
        port.expect_generate()
            .returning(|_| Ok(r#"{"narrative": "You enter the inn.", "mood": "calm"}"#.to_string()));
        let map = generator_with(port)
            .generate_structured("sys", "user", "", None, None)
            .await
            .expect("structured");
        assert_eq!(map["narrative"], "You enter the inn.");
        assert!(!map.contains_key(PARSE_ERROR_KEY));
    }

    #[tokio::test]
    async fn structured_extracts_fenced_block() {
        let mut port = MockGeneratorPort::new();
        port.expect_generate().returning(|_| {
            Ok("Here you go:\n```json\n{\"mood\": \"tense\"}\n```\nEnjoy!".to_string())
        });
        let map = generator_with(port)
            .generate_structured("sys", "user", "", None, None)
            .await
            .expect("structured");
        assert_eq!(map["mood"], "tense");
    }

    #[tokio::test]
    async fn structured_extracts_braced_substring() {
        let mut port = MockGeneratorPort::new();
        port.expect_generate()
            .returning(|_| Ok("The answer is {\"mood\": \"somber\"} as requested".to_string()));
        let map = generator_with(port)
            .generate_structured("sys", "user", "", None, None)
            .await
            .expect("structured");
        assert_eq!(map["mood"], "somber");
    }

    #[tokio::test]
    async fn structured_degrades_to_sentinel() {
        let mut port = MockGeneratorPort::new();
        port.expect_generate()
            .returning(|_| Ok("I cannot produce JSON today.".to_string()));
        let map = generator_with(port)
            .generate_structured("sys", "user", "", None, None)
            .await
            .expect("structured");
        assert_eq!(map[PARSE_ERROR_KEY], true);
        assert_eq!(map["mood"], "neutral");
        assert_eq!(map["narrative"], "I cannot produce JSON today.");
    }

    #[tokio::test]
    async fn retry_recovers_from_rate_limit() {
        let mut port = MockGeneratorPort::new();
        let mut calls = 0u32;
        port.expect_generate().returning(move |_| {
            calls += 1;
            if calls < 3 {
                Err(GeneratorError::RateLimited)
            } else {
                Ok("recovered".to_string())
            }
        });
        let text = generator_with(port)
            .generate_with_retry("sys", "user", "", None, None)
            .await
            .expect("retry");
        assert_eq!(text, "recovered");
    }

    #[tokio::test]
    async fn non_transient_errors_propagate_immediately() {
        let mut port = MockGeneratorPort::new();
        let mut calls = 0u32;
        port.expect_generate().returning(move |_| {
            calls += 1;
            assert_eq!(calls, 1, "non-transient error must not be retried");
            Err(GeneratorError::InvalidResponse("bad shape".to_string()))
        });
        let err = generator_with(port)
            .generate_with_retry("sys", "user", "", None, None)
            .await
            .expect_err("should fail");
        assert!(matches!(err, GeneratorError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn exhausted_retries_become_unavailable() {
        let mut port = MockGeneratorPort::new();
        port.expect_generate()
            .returning(|_| Err(GeneratorError::Server(503)));
        let err = generator_with(port)
            .generate_with_retry("sys", "user", "", None, None)
            .await
            .expect_err("should exhaust");
        assert!(matches!(err, GeneratorError::Unavailable(_)));
    }

    #[tokio::test]
    async fn streaming_yields_chunks_in_order() {
        use futures_util::StreamExt;

        let mut port = MockGeneratorPort::new();
        port.expect_generate_streaming().returning(|_| {
            let chunks = vec![Ok("Once ".to_string()), Ok("upon ".to_string()), Ok("a time".to_string())];
            Ok(futures_util::stream::iter(chunks).boxed())
        });
        let stream = generator_with(port)
            .generate_streaming("sys", "user", "", None, None)
            .await
            .expect("stream");
        let collected: Vec<String> = stream
            .filter_map(|chunk| async { chunk.ok() })
            .collect()
            .await;
        assert_eq!(collected.join(""), "Once upon a time");
    }

    #[tokio::test]
    async fn context_is_appended_to_system_prompt() {
        let mut port = MockGeneratorPort::new();
        port.expect_generate()
            .withf(|request| request.system.contains("ADDITIONAL CONTEXT:\nThe inn is on fire"))
            .returning(|_| Ok("ok".to_string()));
        generator_with(port)
            .generate("sys", "user", "The inn is on fire", None, None)
            .await
            .expect("generate");
    }
}
