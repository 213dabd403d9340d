//! In-Memory Conversation Store Adapter
//!
//! Keeps conversations in a process-local map.
//! Useful for testing and single-process use.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::conversation::Conversation;
use crate::domain::foundation::ConversationKey;
use crate::ports::{ConversationStore, StoreError};

/// In-memory storage for conversations
#[derive(Debug, Clone, Default)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<ConversationKey, Conversation>>>,
}

impl InMemoryConversationStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data (useful for tests)
    pub async fn clear(&self) {
        self.conversations.write().await.clear();
    }

    /// Get the number of stored conversations
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, key: &ConversationKey) -> Result<Option<Conversation>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(key).cloned())
    }

    async fn set(&self, key: &ConversationKey, conversation: &Conversation) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(key.clone(), conversation.clone());
        Ok(())
    }
}
