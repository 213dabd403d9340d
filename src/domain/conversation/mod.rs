//! Conversation domain module.
//!
//! Parent-linked message threads shared by the hub and local clients.

mod conversation;
mod message;

pub use conversation::Conversation;
pub use message::{Message, Role};
