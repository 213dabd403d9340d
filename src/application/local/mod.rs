//! Local completion orchestration.

mod client;

pub use client::{LocalChatClient, LocalReplyEnvelope, LocalTurnOptions};
