//! Authentication and credential lifecycle
//!
//! Credentials are resolved in a fixed order: environment, then the
//! credential store, then the provider's acquisition strategy (API key
//! prompt, OAuth2 device flow, or nothing at all).

pub mod api_key;
pub mod credential;
pub mod device_flow;
pub mod env;
pub mod events;
pub mod resolver;
pub mod store;
pub mod transport;

use async_trait::async_trait;

pub use api_key::{ApiKeyAuth, ApiKeyPrompt, NoAuth, NoPrompt};
pub use credential::{ApiKeyCredential, Credential, OAuthCredential, StoredCredential};
pub use device_flow::{DeviceFlowAuth, DeviceFlowSession, DeviceFlowState};
pub use env::EnvironmentResolver;
pub use events::{AuthEvent, AuthEventSink, LogSink};
pub use resolver::{AuthResolver, AuthResolverBuilder, CredentialSource};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use transport::{DeviceAuthorization, DeviceFlowTransport, HttpTransport, PollResponse, TokenGrant};

/// A way of producing a fresh credential for a provider.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    async fn acquire(&self, provider: &str) -> Result<Credential, crate::error::AuthError>;
}
