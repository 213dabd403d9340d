//! Domain layer containing the conversation model and protocol logic.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (ids, timestamps, state machine trait)
//! - `conversation` - Parent-linked message threads
//! - `hub` - ChatHub dialect, framing, events and turn request building
//! - `reconstruct` - Per-turn streaming reconstruction state machine

pub mod conversation;
pub mod foundation;
pub mod hub;
pub mod reconstruct;
