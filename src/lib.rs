//! ChatHub Client - streaming chat session engine
//!
//! Talks to a streaming chat hub over a record-framed WebSocket channel and
//! reconstructs complete, moderated replies from its partial events. A
//! companion client talks to a local chat-completion server over SSE. Both
//! thread conversations through a pluggable conversation store.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
