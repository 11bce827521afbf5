//! OpenAI-compatible chat provider implementation.
//!
//! This module provides a [`ChatProvider`] implementation for OpenAI-compatible APIs,
//! including OpenAI's official API and compatible endpoints like GitHub Copilot,
//! LocalAI, Ollama, etc.
//!
//! # Example
//!
//! ```rust,no_run
//! use forge_llm::{ChatProvider, Message, OpenAiCompatProvider};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OpenAiCompatProvider::with_base_url("llama3", "http://localhost:11434/v1")?;
//!
//! let messages = vec![Message::user("Hello!")];
//! let mut stream = provider.generate(None, None, &messages).await?;
//!
//! while let Some(chunk) = stream.next().await {
//!     print!("{}", chunk?);
//! }
//! # Ok(())
//! # }
//! ```

use super::{ChatError, ChatOptions, ChatProvider, GenerateStream};
use crate::message::Message;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// The base URL for the OpenAI API.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat provider.
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
    options: ChatOptions,
    extra_headers: HeaderMap,
}

impl OpenAiCompatProvider {
    /// Creates a new provider for the given model against the OpenAI API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(model: impl Into<String>) -> Result<Self, ChatError> {
        Self::with_options(model, ChatOptions::default())
    }

    /// Creates a new provider with custom options.
    pub fn with_options(model: impl Into<String>, options: ChatOptions) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ChatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            model: model.into(),
            base_url: OPENAI_API_BASE.to_string(),
            options,
            extra_headers: HeaderMap::new(),
        })
    }

    /// Creates a new provider with a custom base URL.
    ///
    /// This is useful for GitHub Copilot, LocalAI, Ollama, or other
    /// OpenAI-compatible endpoints.
    pub fn with_base_url(
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ChatError> {
        let mut provider = Self::new(model)?;
        provider.base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(provider)
    }

    /// Adds a static header sent with every request.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ChatError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ChatError::Config(format!("Invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ChatError::Config(format!("Invalid header value: {}", e)))?;
        self.extra_headers.insert(name, value);
        Ok(self)
    }

    /// Returns the API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sets the chat options.
    pub fn set_options(&mut self, options: ChatOptions) {
        self.options = options;
    }

    fn build_headers(&self, auth: Option<&SecretString>) -> Result<HeaderMap, ChatError> {
        let mut headers = self.extra_headers.clone();
        if let Some(secret) = auth {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", secret.expose_secret()))
                // The header value itself must not end up in the message.
                .map_err(|_| ChatError::Config("Credential contains invalid header characters".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn build_request_body(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
    ) -> Result<serde_json::Value, ChatError> {
        let mut msgs = Vec::new();

        if let Some(prompt) = system_prompt {
            msgs.push(serde_json::json!({
                "role": "system",
                "content": prompt
            }));
        }

        for msg in messages {
            msgs.push(serde_json::to_value(msg)?);
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": msgs,
            "stream": self.options.stream,
        });

        if let Some(max_tokens) = self.options.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }

        if let Some(temperature) = self.options.temperature {
            body["temperature"] = temperature.into();
        }

        Ok(body)
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    async fn generate(
        &self,
        auth: Option<&SecretString>,
        system_prompt: Option<&str>,
        messages: &[Message],
    ) -> Result<GenerateStream, ChatError> {
        let url = format!("{}/chat/completions", self.base_url);
        let headers = self.build_headers(auth)?;
        let body = self.build_request_body(system_prompt, messages)?;

        tracing::debug!(model = %self.model, url = %url, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChatError::from_status(status, error_text));
        }

        let stream = process_stream(response.bytes_stream());

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Processes the SSE stream, buffering partial lines across network chunks.
fn process_stream(
    stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<String, ChatError>> + Send + 'static {
    stream
        .scan(SseDecoder::default(), |decoder, result| {
            let chunks = match result {
                Ok(bytes) => decoder.push(&bytes),
                Err(e) => vec![Err(ChatError::Request(e))],
            };
            futures::future::ready(Some(chunks))
        })
        .flat_map(futures::stream::iter)
}

/// Incremental SSE line decoder.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence cut by a frame boundary.
    partial: Vec<u8>,
    finished: bool,
}

impl SseDecoder {
    /// Feeds raw bytes and returns the content chunks of every complete line.
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, ChatError>> {
        let mut results = Vec::new();
        if self.finished {
            return results;
        }

        self.partial.extend_from_slice(bytes);
        let complete = match std::str::from_utf8(&self.partial) {
            Ok(_) => self.partial.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                self.partial.clear();
                return vec![Err(ChatError::Parse(format!("Invalid UTF-8: {}", e)))];
            }
        };
        let tail = self.partial.split_off(complete);
        let decoded = std::mem::replace(&mut self.partial, tail);
        self.buffer.push_str(&String::from_utf8_lossy(&decoded));

        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();

            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();

                if data == "[DONE]" {
                    self.finished = true;
                    self.buffer.clear();
                    break;
                }

                match parse_chunk_json(data) {
                    Ok(Some(content)) => results.push(Ok(content)),
                    Ok(None) => {}
                    Err(e) => results.push(Err(e)),
                }
            }
        }

        results
    }
}

/// Parses a single SSE data chunk.
fn parse_chunk_json(data: &str) -> Result<Option<String>, ChatError> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| ChatError::Parse(format!("Failed to parse chunk: {}", e)))?;

    if let Some(error) = chunk.error {
        let message = error.message.unwrap_or_else(|| "stream error".to_string());
        let code = error.code.as_deref().or(error.error_type.as_deref()).unwrap_or_default();
        return Err(match code {
            "invalid_api_key" | "unauthorized" | "authentication_error" | "token_expired" => {
                ChatError::Unauthorized { status: 0, message }
            }
            _ => ChatError::Api { status: 0, message },
        });
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content))
}

/// A chunk from the streaming response.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamErrorBody>,
}

/// A choice within a stream chunk.
#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

/// The delta content within a choice.
#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// An error event delivered inside the stream.
#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    message: Option<String>,
    code: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
}
