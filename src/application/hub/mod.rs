//! Hub turn orchestration.
//!
//! - `HubClient` - one turn end to end
//! - `TurnOptions` / `EffectiveOptions` - per-call overlay on `HubConfig`
//! - `TransportSession` - channel, handshake, heartbeat, teardown
//! - `AssetTask` - side-channel image generation

mod asset_task;
mod client;
mod options;
mod transport;

pub use asset_task::AssetTask;
pub use client::{HubClient, ReplyEnvelope};
pub use options::{Continuation, EffectiveOptions, ImageSource, TurnOptions};
pub use transport::{TransportSession, TransportSettings};
