//! Streaming responses that stay authenticated while they are consumed
//!
//! A [`StreamSession`] is owned by exactly one stream. Proactive refresh runs
//! synchronously between chunks; a provider rejection triggers at most one
//! forced re-authentication per session.

pub mod handle;
pub mod handler;
pub mod wrapper;

pub use handle::ModelHandle;
pub use handler::{StreamSession, StreamingAuthHandler, MAX_AUTH_RETRIES};
pub use wrapper::{authenticated_stream, AuthenticatedStream, ResponseProducer, StreamError};
