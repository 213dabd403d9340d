//! Conversation Store Port - Interface for persisting conversation threads.
//!
//! Keyed by an opaque conversation key. Eviction is left to the backend;
//! this crate never deletes conversations.

use async_trait::async_trait;

use crate::domain::conversation::Conversation;
use crate::domain::foundation::ConversationKey;

/// Errors that can occur during conversation store operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to serialize conversation: {0}")]
    SerializationFailed(String),

    #[error("Failed to deserialize conversation: {0}")]
    DeserializationFailed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::IoError(_) | StoreError::Backend(_))
    }
}

/// Port for loading and saving conversations
///
/// Calls for different keys must not interfere with each other. Writes for
/// the same key are serialized by the caller.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load a conversation
    ///
    /// # Returns
    /// `None` when nothing is stored under `key`
    async fn get(&self, key: &ConversationKey) -> Result<Option<Conversation>, StoreError>;

    /// Replace the conversation stored under `key`
    async fn set(&self, key: &ConversationKey, conversation: &Conversation) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_messages() {
        let err = StoreError::SerializationFailed("bad yaml".to_string());
        assert!(err.to_string().contains("serialize"));

        let err = StoreError::Backend("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn store_error_retryable_classification() {
        assert!(StoreError::IoError("disk".into()).is_retryable());
        assert!(StoreError::Backend("redis".into()).is_retryable());
        assert!(!StoreError::DeserializationFailed("x".into()).is_retryable());
    }
}
