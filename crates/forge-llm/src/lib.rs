//! # forge-llm
//!
//! An LLM abstraction layer used by modelforge.
//!
//! This crate provides a unified interface for talking to chat-completion
//! providers. Credentials are not owned by providers: every call receives the
//! secret to put on the wire, so a caller can swap tokens between calls
//! without rebuilding the provider.
//!
//! ## Features
//!
//! - **Unified ChatProvider trait** - Abstract interface for LLM providers
//! - **Streaming responses** - Token-by-token SSE streaming
//! - **Typed auth failures** - 401/403 surface as [`ChatError::Unauthorized`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use forge_llm::{ChatProvider, Message, OpenAiCompatProvider};
//! use futures::StreamExt;
//! use secrecy::SecretString;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OpenAiCompatProvider::new("gpt-4o-mini")?;
//! let key = SecretString::new("sk-...".to_string());
//!
//! let messages = vec![Message::user("Hello, how are you?")];
//!
//! let mut stream = provider.generate(Some(&key), None, &messages).await?;
//! while let Some(chunk) = stream.next().await {
//!     print!("{}", chunk?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod chat_provider;
pub mod message;

pub use chat_provider::openai::OpenAiCompatProvider;
pub use chat_provider::{ChatError, ChatOptions, ChatProvider, GenerateStream};
pub use message::{Message, Role};

// Re-export async_trait for users implementing custom providers
pub use async_trait::async_trait;
