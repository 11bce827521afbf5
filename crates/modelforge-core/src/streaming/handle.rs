//! Ready-to-use model handle: a chat provider plus its credentials

use async_trait::async_trait;
use forge_llm::{ChatError, ChatProvider, GenerateStream, Message, OpenAiCompatProvider};
use futures::TryStreamExt;
use std::sync::Arc;

use crate::auth::{AuthResolver, Credential};
use crate::error::AuthError;
use crate::streaming::handler::StreamingAuthHandler;
use crate::streaming::wrapper::{authenticated_stream, AuthenticatedStream, ResponseProducer, StreamError};

/// One chat request, re-openable with a different credential.
struct ChatCall {
    chat: Arc<dyn ChatProvider>,
    system_prompt: Option<String>,
    messages: Vec<Message>,
}

#[async_trait]
impl ResponseProducer for ChatCall {
    async fn open(
        &self,
        credential: &Credential,
        _resume_from: usize,
    ) -> Result<GenerateStream, ChatError> {
        self.chat
            .generate(
                credential.bearer(),
                self.system_prompt.as_deref(),
                &self.messages,
            )
            .await
    }
}

/// A chat model bound to a provider whose credentials are managed for it.
#[derive(Clone)]
pub struct ModelHandle {
    provider: String,
    chat: Arc<dyn ChatProvider>,
    handler: StreamingAuthHandler,
}

impl ModelHandle {
    pub fn new(
        provider: impl Into<String>,
        chat: Arc<dyn ChatProvider>,
        resolver: Arc<AuthResolver>,
    ) -> Self {
        Self {
            provider: provider.into(),
            chat,
            handler: StreamingAuthHandler::new(resolver),
        }
    }

    /// Builds an OpenAI-compatible client from the provider's registry entry.
    ///
    /// `model` overrides the provider's default model.
    pub fn for_provider(
        resolver: Arc<AuthResolver>,
        provider: &str,
        model: Option<&str>,
    ) -> Result<Self, AuthError> {
        let config = resolver
            .registry()
            .get(provider)
            .ok_or_else(|| AuthError::UnknownProvider(provider.to_string()))?;
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            AuthError::Validation(format!("provider {} has no base_url", config.provider_id))
        })?;
        let model = model
            .or(config.default_model.as_deref())
            .ok_or_else(|| {
                AuthError::Validation(format!(
                    "no model given and provider {} has no default_model",
                    config.provider_id
                ))
            })?;

        let chat = OpenAiCompatProvider::with_base_url(model, base_url)
            .map_err(|e| AuthError::Validation(e.to_string()))?;
        let provider_id = config.provider_id.clone();
        Ok(Self::new(provider_id, Arc::new(chat), resolver))
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model_name(&self) -> &str {
        self.chat.model_name()
    }

    /// Streams a response, keeping the credential valid throughout.
    pub fn stream(&self, system_prompt: Option<&str>, messages: &[Message]) -> AuthenticatedStream {
        let call = ChatCall {
            chat: self.chat.clone(),
            system_prompt: system_prompt.map(str::to_string),
            messages: messages.to_vec(),
        };
        authenticated_stream(self.handler.clone(), Arc::new(call), self.provider.clone())
    }

    /// Collects the whole response into one string.
    pub async fn complete(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
    ) -> Result<String, StreamError> {
        self.stream(system_prompt, messages)
            .try_fold(String::new(), |mut text, chunk| async move {
                text.push_str(&chunk);
                Ok(text)
            })
            .await
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("provider", &self.provider)
            .field("model", &self.chat.model_name())
            .finish()
    }
}
