//! Chat provider abstractions for LLM interactions.
//!
//! This module defines the core [`ChatProvider`] trait and related types
//! for implementing LLM provider clients.

use crate::message::Message;
use async_trait::async_trait;
use futures::Stream;
use secrecy::SecretString;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during chat operations.
#[derive(Error, Debug)]
pub enum ChatError {
    /// An error occurred while making the HTTP request.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// An error occurred while parsing the response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The provider rejected the credential (HTTP 401/403 or an in-stream
    /// authentication error event).
    #[error("Unauthorized ({status}): {message}")]
    Unauthorized {
        /// The HTTP status code, or 0 when the failure arrived mid-stream.
        status: u16,
        /// The error message from the API.
        message: String,
    },

    /// The API returned an error response.
    #[error("API error: {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error message from the API.
        message: String,
    },

    /// An error occurred while serializing/deserializing JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An invalid configuration was provided.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ChatError {
    /// Maps a non-success HTTP status to the matching error variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ChatError::Unauthorized { status, message },
            _ => ChatError::Api { status, message },
        }
    }

    /// Returns true when the provider rejected the credential.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ChatError::Unauthorized { .. })
    }
}

/// A stream of generated text chunks.
pub type GenerateStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// The core trait for LLM chat providers.
///
/// Implement this trait to add support for a new LLM provider.
/// The credential is passed per call so callers can rotate it between
/// requests; `None` means the endpoint needs no authentication.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Generates a streaming response from the model.
    ///
    /// # Arguments
    ///
    /// * `auth` - Bearer secret to send, if the provider requires one.
    /// * `system_prompt` - Optional system instructions for the model.
    /// * `messages` - The conversation history.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Unauthorized`] when the credential is rejected,
    /// or another [`ChatError`] if the request fails.
    async fn generate(
        &self,
        auth: Option<&SecretString>,
        system_prompt: Option<&str>,
        messages: &[Message],
    ) -> Result<GenerateStream, ChatError>;

    /// Returns the model name used by this provider.
    fn model_name(&self) -> &str;
}

/// Configuration options for chat completion requests.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// The maximum number of tokens to generate.
    pub max_tokens: Option<u32>,
    /// The sampling temperature (0.0 to 2.0).
    pub temperature: Option<f32>,
    /// Whether to stream the response.
    pub stream: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: None,
            stream: true,
        }
    }
}

impl ChatOptions {
    /// Creates a new ChatOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

pub mod openai;

pub use openai::OpenAiCompatProvider;
