//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the turn engine to external systems:
//! - `hub` - Session negotiation, WebSocket channel, image upload
//! - `images` - Image generator implementations
//! - `local` - Local chat-completion provider
//! - `storage` - Conversation stores (memory, file, Redis)

pub mod hub;
pub mod images;
pub mod local;
pub mod storage;
