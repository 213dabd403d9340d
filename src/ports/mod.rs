//! Ports - Interfaces for external dependencies.
//!
//! Ports define the contracts between the turn engine and the outside world.
//! Adapters implement these ports.
//!
//! ## Hub Ports
//!
//! - `HubConnector` - Session negotiation and channel opening
//! - `HubChannel` - One open record-framed duplex channel
//! - `ImageUploader` / `ImageGenerator` - Attachment upload and asset rendering
//!
//! ## Shared Ports
//!
//! - `ConversationStore` - Keyed conversation persistence
//! - `CompletionProvider` - Local chat-completion endpoint
//! - `ProgressListener` - Streaming text sink

mod completion_provider;
mod conversation_store;
mod hub_connector;
mod image_service;
mod progress;

pub use completion_provider::{
    ChatMessage, ChunkStream, CompletionError, CompletionProvider, CompletionRequest,
    CompletionResponse, FinishReason, ProviderInfo, StreamChunk,
};
pub use conversation_store::{ConversationStore, StoreError};
pub use hub_connector::{HubChannel, HubConnector, HubError};
pub use image_service::{AssetError, ImageGenerator, ImageUploader};
pub use progress::{NoopProgress, ProgressListener};
