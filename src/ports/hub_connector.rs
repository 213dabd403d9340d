//! Hub Connector Port - Interface for session negotiation and the duplex channel.
//!
//! The connector negotiates sessions over HTTP and opens record-framed text
//! channels authenticated by a session. A channel carries exactly one turn.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::conversation_store::StoreError;
use crate::domain::hub::SessionHandle;
use crate::domain::reconstruct::TurnError;

/// Port for creating hub sessions and opening channels
#[async_trait]
pub trait HubConnector: Send + Sync {
    /// Negotiate a fresh session
    ///
    /// # Errors
    /// `HubError::SessionCreationFailed` carrying the service's result code
    /// (for example `UnauthorizedRequest`) when the service refuses.
    async fn create_session(&self) -> Result<SessionHandle, HubError>;

    /// Open a duplex channel authenticated by `session`
    async fn connect(&self, session: &SessionHandle) -> Result<Box<dyn HubChannel>, HubError>;
}

/// An open duplex text channel.
///
/// Writes go through an unbounded sender so the heartbeat and the turn can
/// share the channel while the reader is borrowed mutably.
#[async_trait]
pub trait HubChannel: Send {
    /// Sender for raw outbound text (already record-terminated).
    fn outbound(&self) -> mpsc::UnboundedSender<String>;

    /// Next inbound text message; `None` once the peer has closed.
    async fn next_text(&mut self) -> Option<Result<String, HubError>>;

    /// Close the channel. Calling it again is a no-op.
    async fn close(&mut self);
}

/// Hub client errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HubError {
    /// The session-creation endpoint refused or returned garbage.
    #[error("{code}: {message}")]
    SessionCreationFailed {
        /// Service result code, surfaced verbatim.
        code: String,
        message: String,
    },

    /// Unexpected handshake or frame shape.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("InvalidSession: {message}")]
    InvalidSession { message: String },

    /// Result-level error reported by the service with no usable text.
    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    #[error("No message was generated.")]
    NoMessageGenerated,

    #[error("Unexpected message author.")]
    UnexpectedAuthor { author: Option<String> },

    #[error("{reason}")]
    ConnectionClosed { reason: String },

    #[error("Event Type('{kind}'): {error}")]
    UnexpectedEvent { kind: String, error: String },

    #[error("Timed out waiting for response after {secs}s")]
    Timeout { secs: u64 },

    #[error("Request aborted")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("conversation store error: {0}")]
    Store(#[from] StoreError),
}

impl HubError {
    /// Creates a session creation error.
    pub fn session_creation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SessionCreationFailed {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Stable code for callers deciding on retries. Service codes are
    /// passed through unchanged.
    pub fn code(&self) -> &str {
        match self {
            HubError::SessionCreationFailed { code, .. } | HubError::Remote { code, .. } => code,
            HubError::ProtocolViolation(_) => "ProtocolViolation",
            HubError::InvalidSession { .. } => "InvalidSession",
            HubError::NoMessageGenerated => "NoMessageGenerated",
            HubError::UnexpectedAuthor { .. } => "UnexpectedAuthor",
            HubError::ConnectionClosed { .. } => "ConnectionClosed",
            HubError::UnexpectedEvent { .. } => "UnexpectedEvent",
            HubError::Timeout { .. } => "Timeout",
            HubError::Cancelled => "Cancelled",
            HubError::Transport(_) => "Transport",
            HubError::Store(_) => "Store",
        }
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            HubError::Timeout { .. }
            | HubError::Transport(_)
            | HubError::ConnectionClosed { .. }
            | HubError::NoMessageGenerated => true,
            HubError::Remote { code, .. } | HubError::SessionCreationFailed { code, .. } => {
                matches!(code.as_str(), "Throttled" | "ServiceUnavailable")
            }
            HubError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<TurnError> for HubError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::ProtocolViolation(detail) => HubError::ProtocolViolation(detail),
            TurnError::InvalidSession { message } => HubError::InvalidSession { message },
            TurnError::Remote { code, message } => HubError::Remote { code, message },
            TurnError::NoMessageGenerated => HubError::NoMessageGenerated,
            TurnError::UnexpectedAuthor { author } => HubError::UnexpectedAuthor { author },
            TurnError::ConnectionClosed { reason } => HubError::ConnectionClosed { reason },
            TurnError::UnexpectedEvent { kind, error } => HubError::UnexpectedEvent { kind, error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_codes_pass_through() {
        let err = HubError::from(TurnError::Remote {
            code: "Throttled".into(),
            message: "Request is throttled.".into(),
        });
        assert_eq!(err.code(), "Throttled");
        assert_eq!(err.to_string(), "Throttled: Request is throttled.");
        assert!(err.is_retryable());
    }

    #[test]
    fn session_creation_code_is_verbatim() {
        let err = HubError::session_creation("UnauthorizedRequest", "Sorry, you need to login first.");
        assert_eq!(err.code(), "UnauthorizedRequest");
        assert!(!err.is_retryable());
    }

    #[test]
    fn invalid_session_is_terminal() {
        let err = HubError::from(TurnError::InvalidSession { message: "gone".into() });
        assert_eq!(err.code(), "InvalidSession");
        assert!(!err.is_retryable());
    }

    #[test]
    fn cancellation_and_timeout_messages() {
        assert_eq!(HubError::Cancelled.to_string(), "Request aborted");
        assert!(HubError::Timeout { secs: 300 }.to_string().contains("300"));
        assert!(HubError::Timeout { secs: 300 }.is_retryable());
        assert!(!HubError::Cancelled.is_retryable());
    }

    #[test]
    fn store_errors_convert() {
        let err: HubError = StoreError::Backend("down".into()).into();
        assert_eq!(err.code(), "Store");
        assert!(err.is_retryable());
    }
}
