//! modelforge-core - credential resolution and authenticated model access
//!
//! [`AuthResolver`] turns a provider id into a usable credential
//! (environment, stored record, or a fresh login). [`ModelHandle`] wraps a
//! chat provider so its streaming responses survive token expiry.

pub mod auth;
pub mod config;
pub mod error;
pub mod streaming;

pub use auth::{
    AuthEvent, AuthEventSink, AuthResolver, AuthResolverBuilder, Credential, CredentialSource,
    CredentialStore, EnvironmentResolver, FileCredentialStore, MemoryCredentialStore,
};
pub use config::{
    load_config, save_config, AuthSettings, Config, ConfigError, DeviceFlowEndpoints,
    ProviderAuthConfig, ProviderRegistry, Strategy,
};
pub use error::AuthError;
pub use streaming::{ModelHandle, StreamError};
