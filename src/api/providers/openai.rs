//! OpenAI-compatible chat completions provider

use async_stream::stream;
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::api::{ApiError, TextGenerator, TextRequest};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const PROVIDER_NAME: &str = "openai";
const API_KEY_ENV: &str = "MARKETFLOW_OPENAI_API_KEY";

/// Text generation over the `/chat/completions` endpoint
pub struct OpenAiTextGenerator {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
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
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

impl OpenAiTextGenerator {
    pub fn new(api_key: impl Into<String>, timeout_secs: u64) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder().user_agent("marketflow/0.1");
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            client,
            base_url: OPENAI_API_BASE.to_string(),
            timeout_secs,
        })
    }

    /// Create provider from the MARKETFLOW_OPENAI_API_KEY environment variable
    pub fn from_env(timeout_secs: u64) -> Result<Option<Self>, ApiError> {
        match env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => Ok(Some(Self::new(key, timeout_secs)?)),
            _ => Ok(None),
        }
    }

    /// Point the provider at a different OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn body<'a>(request: &'a TextRequest, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &request.params.model,
            messages: vec![
                ChatMessage {
                    role: "developer",
                    content: &request.instructions,
                },
                ChatMessage {
                    role: "user",
                    content: &request.input,
                },
            ],
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            stream,
        }
    }

    async fn send(&self, request: &TextRequest, stream: bool) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Self::body(request, stream))
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(PROVIDER_NAME, &e, self.timeout_secs))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = retry_after_secs(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(
            PROVIDER_NAME,
            status.as_u16(),
            retry_after,
            body,
        ))
    }
}

/// Parse a `retry-after` header given in seconds
pub(crate) fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Extract the delta text from one SSE `data:` line.
///
/// Returns `None` for non-data lines and the `[DONE]` sentinel.
fn parse_sse_line(line: &str) -> Option<Result<String, ApiError>> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map(Ok),
        Err(e) => Some(Err(ApiError::invalid_response(
            PROVIDER_NAME,
            format!("bad stream chunk: {}", e),
        ))),
    }
}

/// Splits a byte stream into lines. Bytes are held until their line is
/// complete, so a multi-byte character split across chunks decodes intact.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            lines.push(String::from_utf8_lossy(&line[..end]).into_owned());
        }
        lines
    }

    /// Whatever trails the last newline
    fn finish(self) -> Option<String> {
        (!self.pending.is_empty()).then(|| String::from_utf8_lossy(&self.pending).into_owned())
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn generate(&self, request: &TextRequest) -> Result<String, ApiError> {
        let response = self.send(request, false).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ApiError::invalid_response(PROVIDER_NAME, e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ApiError::invalid_response(PROVIDER_NAME, "no choices in response"))
    }

    fn generate_stream<'a>(
        &'a self,
        request: &'a TextRequest,
    ) -> BoxStream<'a, Result<String, ApiError>> {
        Box::pin(stream! {
            let response = match self.send(request, true).await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut bytes = response.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        for line in lines.push(&chunk) {
                            if let Some(delta) = parse_sse_line(line.trim()) {
                                yield delta;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(ApiError::from_reqwest(PROVIDER_NAME, &e, self.timeout_secs));
                        return;
                    }
                }
            }

            if let Some(delta) = lines.finish().and_then(|line| parse_sse_line(line.trim())) {
                yield delta;
            }
        })
    }
}
