//! Conversation entity - ordered, parent-linked message log.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::conversation::Message;
use crate::domain::foundation::{MessageId, Timestamp};

/// All messages exchanged under one conversation key.
///
/// Messages are kept in insertion order and only ever appended. Branching
/// happens through parent links: a turn may hang off any earlier message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    messages: Vec<Message>,
    created_at: Timestamp,
}

impl Conversation {
    /// Creates an empty conversation.
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            created_at: Timestamp::now(),
        }
    }

    /// Reconstitutes a conversation from persistence.
    pub fn reconstitute(messages: Vec<Message>, created_at: Timestamp) -> Self {
        Self { messages, created_at }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Finds a message by id.
    pub fn find(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    /// Returns the thread ending at `leaf`, ordered root to leaf.
    ///
    /// The walk follows parent links until a root is reached. A parent that
    /// is not stored truncates the chain at that point, and a revisited id
    /// stops the walk. An unknown `leaf` yields an empty chain.
    pub fn ancestor_chain(&self, leaf: MessageId) -> Vec<&Message> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(leaf);

        while let Some(id) = cursor {
            if !seen.insert(id) {
                break;
            }
            let Some(message) = self.find(id) else {
                break;
            };
            chain.push(message);
            cursor = message.parent_message_id();
        }

        chain.reverse();
        chain
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
