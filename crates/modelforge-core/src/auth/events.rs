//! Progress events emitted during interactive authentication

use tokio::sync::mpsc::UnboundedSender;

/// Progress of an interactive login, for whatever UI is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Info { message: String },
    Error { message: String },
    Waiting { message: String },
    /// The human has to visit `url` and enter `user_code`.
    VerificationUrl { url: String, user_code: String },
    Success { message: String },
}

impl AuthEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info { message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    pub fn waiting(message: impl Into<String>) -> Self {
        Self::Waiting { message: message.into() }
    }

    pub fn verification_url(url: impl Into<String>, user_code: impl Into<String>) -> Self {
        Self::VerificationUrl {
            url: url.into(),
            user_code: user_code.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::Success { message: message.into() }
    }
}

/// Receives auth progress. The display side is a UI concern.
pub trait AuthEventSink: Send + Sync {
    fn emit(&self, event: AuthEvent);
}

/// Forwards events to `tracing` only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AuthEventSink for LogSink {
    fn emit(&self, event: AuthEvent) {
        match event {
            AuthEvent::VerificationUrl { url, user_code } => {
                tracing::info!(%url, %user_code, "Device authorization required")
            }
            AuthEvent::Success { message } => tracing::info!("{}", message),
            AuthEvent::Error { message } => tracing::warn!("{}", message),
            AuthEvent::Info { message } | AuthEvent::Waiting { message } => {
                tracing::debug!("{}", message)
            }
        }
    }
}

impl AuthEventSink for UnboundedSender<AuthEvent> {
    fn emit(&self, event: AuthEvent) {
        // The receiver going away only means nobody is watching.
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_forwards_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.emit(AuthEvent::verification_url("https://example.com/device", "ABCD-1234"));
        assert_eq!(
            rx.try_recv().unwrap(),
            AuthEvent::VerificationUrl {
                url: "https://example.com/device".into(),
                user_code: "ABCD-1234".into(),
            }
        );
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        tx.emit(AuthEvent::info("nobody listening"));
    }

    #[test]
    fn test_constructors() {
        assert_eq!(
            AuthEvent::waiting("polling"),
            AuthEvent::Waiting { message: "polling".into() }
        );
        assert_eq!(AuthEvent::success("done"), AuthEvent::Success { message: "done".into() });
    }
}
