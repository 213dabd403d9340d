//! Application layer - turn orchestration over the ports.
//!
//! - `hub` - streaming chat hub client
//! - `local` - local chat-completion client
//! - `TurnLocks` - at most one in-flight turn per conversation

pub mod hub;
pub mod local;
mod turn_locks;

pub use hub::{Continuation, HubClient, ImageSource, ReplyEnvelope, TurnOptions};
pub use local::{LocalChatClient, LocalReplyEnvelope, LocalTurnOptions};
pub use turn_locks::{TurnGuard, TurnLocks};
