//! Message entity for threaded conversations.
//!
//! Messages form a tree through their parent links. A turn appends a user
//! message whose parent is the caller-supplied message id, then an assistant
//! reply whose parent is that user message.

use crate::domain::foundation::MessageId;
use serde::{Deserialize, Serialize};

/// Role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Remote or local assistant reply.
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion style APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A message within a conversation.
///
/// # Invariants
///
/// - `id` is globally unique
/// - `parent_message_id` is `None` only for a thread root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: MessageId,

    parent_message_id: Option<MessageId>,

    role: Role,

    text: String,

    /// Raw service payload kept alongside assistant replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl Message {
    /// Creates a new message with a fresh id.
    pub fn new(role: Role, text: impl Into<String>, parent_message_id: Option<MessageId>) -> Self {
        Self {
            id: MessageId::new(),
            parent_message_id,
            role,
            text: text.into(),
            details: None,
        }
    }

    /// Creates a user message.
    pub fn user(text: impl Into<String>, parent_message_id: Option<MessageId>) -> Self {
        Self::new(Role::User, text, parent_message_id)
    }

    /// Creates an assistant message.
    pub fn assistant(text: impl Into<String>, parent_message_id: Option<MessageId>) -> Self {
        Self::new(Role::Assistant, text, parent_message_id)
    }

    /// Creates a system message.
    pub fn system(text: impl Into<String>, parent_message_id: Option<MessageId>) -> Self {
        Self::new(Role::System, text, parent_message_id)
    }

    /// Overrides the generated id.
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    /// Attaches the raw service payload.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn parent_message_id(&self) -> Option<MessageId> {
        self.parent_message_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn details(&self) -> Option<&serde_json::Value> {
        self.details.as_ref()
    }

    /// Returns true for thread roots.
    pub fn is_root(&self) -> bool {
        self.parent_message_id.is_none()
    }
}
