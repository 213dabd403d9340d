//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the state machine trait and
//! validation errors used across the conversation and hub modules.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::ValidationError;
pub use ids::{ConversationKey, MessageId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
