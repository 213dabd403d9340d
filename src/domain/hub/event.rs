//! Typed view over inbound hub events.
//!
//! Bot messages are kept as raw JSON so the final reply can be handed back to
//! callers with every service-supplied field intact.

use serde_json::{Map, Value};

/// Author tag of assistant messages.
pub const BOT_AUTHOR: &str = "bot";

/// Message sub-kinds that carry tool or search telemetry rather than text.
pub const TELEMETRY_MESSAGE_TYPES: [&str; 5] = [
    "InternalLoaderMessage",
    "InternalSearchQuery",
    "InternalSearchResult",
    "GenerateContentQuery",
    "RenderCardRequest",
];

/// Result code the service uses when the session is no longer valid.
pub const INVALID_SESSION: &str = "InvalidSession";

/// One decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// Type 1: the full accumulated text of the reply so far.
    Update { messages: Vec<BotMessage> },
    /// Type 2: the authoritative final messages of the turn.
    Completion(CompletionItem),
    /// Type 7: the service is closing the connection.
    Close { error: Option<String> },
    /// Anything else, including pings echoed back.
    Other { kind: Option<i64>, error: Option<String> },
}

impl HubEvent {
    /// Classifies a decoded frame unit by its `type` field.
    pub fn from_value(value: Value) -> Self {
        let kind = value.get("type").and_then(Value::as_i64);
        match kind {
            Some(1) => {
                let messages = value
                    .pointer("/arguments/0/messages")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().cloned().map(BotMessage::new).collect())
                    .unwrap_or_default();
                HubEvent::Update { messages }
            }
            Some(2) => HubEvent::Completion(CompletionItem::from_value(
                value.get("item").cloned().unwrap_or(Value::Null),
            )),
            Some(7) => HubEvent::Close {
                error: string_field(&value, "error"),
            },
            _ => HubEvent::Other {
                kind,
                error: value.get("error").filter(|e| is_truthy(e)).map(stringify),
            },
        }
    }
}

/// Payload of a type 2 event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionItem {
    pub messages: Vec<BotMessage>,
    pub result: Option<ResultInfo>,
    pub conversation_expiry_time: Option<String>,
}

impl CompletionItem {
    fn from_value(item: Value) -> Self {
        let messages = item
            .get("messages")
            .and_then(Value::as_array)
            .map(|items| items.iter().cloned().map(BotMessage::new).collect())
            .unwrap_or_default();
        let result = item.get("result").filter(|r| r.is_object()).map(|r| ResultInfo {
            value: string_field(r, "value"),
            message: string_field(r, "message"),
            error: r.get("error").filter(|e| is_truthy(e)).map(stringify),
        });
        Self {
            messages,
            result,
            conversation_expiry_time: string_field(&item, "conversationExpiryTime"),
        }
    }

    /// Result code such as `Success`, `Throttled` or `InvalidSession`.
    pub fn result_value(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.value.as_deref())
    }

    pub fn result_message(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.message.as_deref())
    }

    /// True when the service flagged a result-level error.
    pub fn has_error(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.error.is_some())
    }

    /// Moderation markers carried by the final messages.
    pub fn moderation_signalled(&self) -> bool {
        let first = self.messages.first();
        first.is_some_and(|m| m.has_topic_changer() || m.offense() == Some("OffenseTrigger"))
            || self
                .messages
                .get(1)
                .is_some_and(|m| m.content_origin() == Some("Apology"))
    }
}

/// Outcome block of a completion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultInfo {
    pub value: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// A message object as sent by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct BotMessage(Value);

impl BotMessage {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn author(&self) -> Option<&str> {
        self.0.get("author").and_then(Value::as_str)
    }

    pub fn is_from_bot(&self) -> bool {
        self.author() == Some(BOT_AUTHOR)
    }

    pub fn text(&self) -> Option<&str> {
        self.0.get("text").and_then(Value::as_str)
    }

    pub fn message_type(&self) -> Option<&str> {
        self.0.get("messageType").and_then(Value::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.0.get("contentType").and_then(Value::as_str)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.0.get("messageId").and_then(Value::as_str)
    }

    pub fn offense(&self) -> Option<&str> {
        self.0.get("offense").and_then(Value::as_str)
    }

    pub fn content_origin(&self) -> Option<&str> {
        self.0.get("contentOrigin").and_then(Value::as_str)
    }

    pub fn has_topic_changer(&self) -> bool {
        self.0.get("topicChangerText").is_some_and(is_truthy)
    }

    /// Generated-image placeholder.
    pub fn is_image(&self) -> bool {
        self.content_type() == Some("IMAGE")
    }

    /// Search, loader and render telemetry.
    pub fn is_telemetry(&self) -> bool {
        self.message_type()
            .is_some_and(|t| TELEMETRY_MESSAGE_TYPES.contains(&t))
    }

    /// Any moderation marker on an incremental update.
    pub fn is_moderated(&self) -> bool {
        self.has_topic_changer()
            || self.offense() == Some("OffenseTrigger")
            || self.content_origin() == Some("Apology")
    }

    /// Replaces the display text and the first adaptive card text block.
    pub fn set_text(&mut self, text: &str) {
        if let Some(obj) = self.0.as_object_mut() {
            obj.insert("text".to_string(), Value::String(text.to_string()));
        }
        if let Some(block) = self.card_block_mut() {
            block.insert("text".to_string(), Value::String(text.to_string()));
        }
    }

    /// Appends to the display text and the card text block.
    pub fn append_text(&mut self, suffix: &str) {
        let text = format!("{}{}", self.text().unwrap_or_default(), suffix);
        if let Some(obj) = self.0.as_object_mut() {
            obj.insert("text".to_string(), Value::String(text));
        }
        if let Some(block) = self.card_block_mut() {
            let card = block
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            block.insert("text".to_string(), Value::String(card + suffix));
        }
    }

    /// Removes suggested follow-ups.
    pub fn strip_suggestions(&mut self) {
        if let Some(obj) = self.0.as_object_mut() {
            obj.remove("suggestedResponses");
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn card_block_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.0
            .pointer_mut("/adaptiveCards/0/body/0")
            .and_then(Value::as_object_mut)
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}
