//! Streaming reconstruction of one hub turn.
//!
//! - `TurnState` - explicit per-turn state fed one frame unit at a time
//! - `PendingReply` / `CompletedReply` - terminal values and asset splicing
//! - `TurnError` - fatal stream outcomes

mod error;
mod phase;
mod reply;
mod state;

pub use error::TurnError;
pub use phase::TurnPhase;
pub use reply::{AssetOutcome, AssetRequest, CompletedReply, PendingReply};
pub use state::{delta_between, FrameAction, TurnState, MODERATION_PLACEHOLDER, STOP_TOKEN};
