//! Lifecycle of a single turn.

use crate::domain::foundation::StateMachine;

/// Phase of one turn's inbound stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TurnPhase {
    /// Waiting for the empty acknowledgement frame.
    #[default]
    AwaitingHandshake,
    /// Receiving incremental updates.
    Streaming,
    /// Resolved with a reply.
    Succeeded,
    /// Resolved with an error.
    Failed,
}

impl StateMachine for TurnPhase {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use TurnPhase::*;
        match self {
            AwaitingHandshake => vec![Streaming, Failed],
            Streaming => vec![Succeeded, Failed],
            Succeeded | Failed => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_leads_to_streaming() {
        assert_eq!(
            TurnPhase::AwaitingHandshake.transition_to(TurnPhase::Streaming),
            Ok(TurnPhase::Streaming)
        );
    }

    #[test]
    fn cannot_succeed_before_handshake() {
        assert!(TurnPhase::AwaitingHandshake
            .transition_to(TurnPhase::Succeeded)
            .is_err());
    }

    #[test]
    fn resolved_phases_are_terminal() {
        assert!(TurnPhase::Succeeded.is_terminal());
        assert!(TurnPhase::Failed.is_terminal());
        assert!(!TurnPhase::Streaming.is_terminal());
    }
}
