//! Hub Adapters
//!
//! Implementations of the hub ports.
//!
//! ## Available Adapters
//!
//! - **HttpHubConnector** - Session creation over HTTP, channels over WebSocket
//! - **WebSocketChannel** - `HubChannel` on a tokio-tungstenite stream
//! - **HttpImageUploader** - Image attachment upload
//! - **ScriptedHubConnector** - Canned traffic for tests

mod http_connector;
mod image_uploader;
mod scripted;
mod websocket_channel;

pub use http_connector::{HttpHubConnector, HubConnectionConfig};
pub use image_uploader::HttpImageUploader;
pub use scripted::{ChannelScript, ScriptProbe, ScriptStep, ScriptedChannel, ScriptedHubConnector};
pub use websocket_channel::WebSocketChannel;
