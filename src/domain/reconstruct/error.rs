//! Failures detected while reconstructing a turn from inbound events.

use thiserror::Error;

/// Fatal outcomes of the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("InvalidSession: {message}")]
    InvalidSession { message: String },

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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_displays_code_and_message() {
        let err = TurnError::Remote {
            code: "Throttled".into(),
            message: "Request is throttled.".into(),
        };
        assert_eq!(err.to_string(), "Throttled: Request is throttled.");
    }

    #[test]
    fn unexpected_event_names_the_type() {
        let err = TurnError::UnexpectedEvent {
            kind: "3".into(),
            error: "boom".into(),
        };
        assert_eq!(err.to_string(), "Event Type('3'): boom");
    }
}
