//! Authenticated wrapper around a provider's chunked response

use async_trait::async_trait;
use forge_llm::{ChatError, GenerateStream};
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::Credential;
use crate::error::AuthError;
use crate::streaming::handler::{StreamSession, StreamingAuthHandler};

/// Terminal failure of an authenticated stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Provider(#[from] ChatError),
}

/// Opens the provider-side chunk stream with a given credential.
#[async_trait]
pub trait ResponseProducer: Send + Sync {
    /// Starts (or restarts) the response. A resumable producer begins at
    /// chunk `resume_from`; others ignore it and start over.
    async fn open(
        &self,
        credential: &Credential,
        resume_from: usize,
    ) -> Result<GenerateStream, ChatError>;

    /// Whether `open` can continue from a given chunk.
    ///
    /// A non-resumable producer is restarted from scratch and the chunks the
    /// caller already received are dropped by count. That is only faithful
    /// when the producer replays the same chunks; a regenerated model
    /// response usually differs, so the caller may see the head of one
    /// response joined to the tail of another.
    fn supports_resume(&self) -> bool {
        false
    }
}

/// Chunks as delivered to the caller.
pub type AuthenticatedStream = Pin<Box<dyn Stream<Item = Result<String, StreamError>> + Send>>;

struct WrapperState {
    handler: StreamingAuthHandler,
    producer: Arc<dyn ResponseProducer>,
    provider: String,
    session: Option<StreamSession>,
    inner: Option<GenerateStream>,
    /// Chunks handed to the caller so far.
    delivered: usize,
    /// Chunks to drop after a non-resumable restart.
    skip: usize,
    done: bool,
}

enum Step {
    Continue,
    Yield(Result<String, StreamError>),
    End,
}

impl WrapperState {
    fn fail(&mut self, error: StreamError) -> Step {
        self.done = true;
        self.inner = None;
        Step::Yield(Err(error))
    }

    async fn open(&mut self) -> Step {
        let Some(session) = self.session.as_mut() else {
            return Step::Continue;
        };
        self.handler.refresh_if_needed(session).await;

        let resumable = self.producer.supports_resume();
        let resume_from = if resumable { self.delivered } else { 0 };
        match self.producer.open(session.credential(), resume_from).await {
            Ok(inner) => {
                if !resumable && self.delivered > 0 {
                    warn!(
                        "Restarted {} response from the beginning; skipping {} delivered chunks, \
                         the regenerated output may not match what was already delivered",
                        self.provider, self.delivered
                    );
                }
                self.skip = if resumable { 0 } else { self.delivered };
                self.inner = Some(inner);
                Step::Continue
            }
            Err(e) if e.is_auth_failure() => self.recover(e).await,
            Err(e) => self.fail(e.into()),
        }
    }

    async fn recover(&mut self, cause: ChatError) -> Step {
        self.inner = None;
        let Some(session) = self.session.as_mut() else {
            return Step::Continue;
        };
        match self.handler.recover(session, cause).await {
            Ok(()) => {
                debug!(
                    "Restarting {} stream after {} delivered chunks",
                    self.provider, self.delivered
                );
                Step::Continue
            }
            Err(e) => self.fail(e.into()),
        }
    }

    async fn step(&mut self) -> Step {
        if self.done {
            return Step::End;
        }

        let Some(session) = self.session.as_mut() else {
            return match self.handler.begin(&self.provider).await {
                Ok(session) => {
                    self.session = Some(session);
                    Step::Continue
                }
                Err(e) => self.fail(e.into()),
            };
        };

        let Some(inner) = self.inner.as_mut() else {
            return self.open().await;
        };

        // Between chunks; the request already in flight keeps its token.
        self.handler.refresh_if_needed(session).await;

        match inner.next().await {
            Some(Ok(chunk)) => {
                if self.skip > 0 {
                    self.skip -= 1;
                    return Step::Continue;
                }
                self.delivered += 1;
                Step::Yield(Ok(chunk))
            }
            Some(Err(e)) if e.is_auth_failure() => self.recover(e).await,
            Some(Err(e)) => self.fail(e.into()),
            None => {
                self.done = true;
                self.inner = None;
                Step::End
            }
        }
    }
}

/// Wraps `producer` so that it is authenticated for `provider`.
///
/// The credential is resolved before the first chunk, refreshed between
/// chunks when close to expiry, and re-acquired at most once if the
/// provider rejects it mid-stream.
pub fn authenticated_stream(
    handler: StreamingAuthHandler,
    producer: Arc<dyn ResponseProducer>,
    provider: impl Into<String>,
) -> AuthenticatedStream {
    let state = WrapperState {
        handler,
        producer,
        provider: provider.into(),
        session: None,
        inner: None,
        delivered: 0,
        skip: 0,
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            match state.step().await {
                Step::Continue => continue,
                Step::Yield(item) => return Some((item, state)),
                Step::End => return None,
            }
        }
    }))
}
