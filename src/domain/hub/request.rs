//! Turn request builder.
//!
//! Turns user input plus resolved per-turn settings into the exact outbound
//! invocation frame. Everything here is pure; randomness (the trace id) is
//! supplied by the caller.

use serde::Serialize;

use super::dialect::DialectSettings;
use super::session::SessionHandle;
use crate::domain::conversation::{Message, Role};

/// Message text sent instead of the user's input in continuation mode.
pub const CONTINUE_INSTRUCTION: &str = "Continue the conversation in context. Assistant:";

/// Prefix that turns an uploaded blob id into an image URL.
pub const IMAGE_BLOB_BASE: &str = "https://www.bing.com/images/blob?bcid=";

/// Fixed id the web client uses for injected page context.
const CONTEXT_MESSAGE_ID: &str = "discover-web--page-ping-mriduna-----";

const ALLOWED_MESSAGE_TYPES: [&str; 9] = [
    "ActionRequest",
    "Chat",
    "Context",
    "InternalSearchQuery",
    "InternalSearchResult",
    "InternalLoaderMessage",
    "Progress",
    "GenerateContentQuery",
    "SearchQuery",
];

const SLICE_IDS: [&str; 10] = [
    "abv2",
    "srdicton",
    "convcssclick",
    "stylewv2",
    "contctxp2tf",
    "802fluxv1pc_a",
    "806log2sphs0",
    "727savemem",
    "277teditgnds0",
    "207hlthgrds0",
];

/// Blob ids returned by the image upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub blob_id: String,
    pub processed_blob_id: String,
}

impl UploadedImage {
    pub fn image_url(&self) -> String {
        format!("{}{}", IMAGE_BLOB_BASE, self.blob_id)
    }

    pub fn original_image_url(&self) -> String {
        format!("{}{}", IMAGE_BLOB_BASE, self.processed_blob_id)
    }
}

/// Speaker tag inside a serialized transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptAuthor {
    System,
    User,
    Assistant,
}

impl TranscriptAuthor {
    fn marker(&self) -> &'static str {
        match self {
            Self::System => "[system](#additional_instructions)",
            Self::User => "[user](#message)",
            Self::Assistant => "[assistant](#message)",
        }
    }
}

impl From<Role> for TranscriptAuthor {
    fn from(role: Role) -> Self {
        match role {
            Role::System => Self::System,
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
        }
    }
}

/// One entry of a serialized transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub author: TranscriptAuthor,
    pub text: String,
}

impl TranscriptLine {
    pub fn new(author: TranscriptAuthor, text: impl Into<String>) -> Self {
        Self {
            author,
            text: text.into(),
        }
    }
}

/// Transcript replayed at the start of a continuation session: the system
/// instructions, the prior thread, then the new user text.
pub fn continuation_transcript(
    system_message: Option<&str>,
    window: &[&Message],
    user_text: &str,
) -> Vec<TranscriptLine> {
    let mut lines = Vec::with_capacity(window.len() + 2);
    if let Some(system) = system_message.filter(|s| !s.is_empty()) {
        lines.push(TranscriptLine::new(TranscriptAuthor::System, system));
    }
    lines.extend(
        window
            .iter()
            .map(|m| TranscriptLine::new(m.role().into(), m.text())),
    );
    lines.push(TranscriptLine::new(TranscriptAuthor::User, user_text));
    lines
}

/// Serializes a transcript with role markers, prepending any external context.
///
/// Returns `None` when there is nothing to send.
pub fn format_context(lines: &[TranscriptLine], external: Option<&str>) -> Option<String> {
    let transcript = lines
        .iter()
        .map(|line| format!("{}\n{}", line.author.marker(), line.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    let external = external.filter(|c| !c.is_empty());

    match (external, transcript.is_empty()) {
        (Some(ctx), false) => Some(format!("{}\n\n{}", ctx, transcript)),
        (Some(ctx), true) => Some(ctx.to_string()),
        (None, false) => Some(transcript),
        (None, true) => None,
    }
}

/// Fresh 32 character hex trace id.
pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Inputs of one outbound turn.
#[derive(Debug, Clone)]
pub struct TurnRequestParams<'a> {
    pub text: &'a str,
    pub session: &'a SessionHandle,
    pub invocation_id: u32,
    pub dialect: DialectSettings,
    /// Replaces the message text with [`CONTINUE_INSTRUCTION`].
    pub continuation: bool,
    /// Already formatted context to inject as page context.
    pub context: Option<String>,
    pub image: Option<&'a UploadedImage>,
    pub locale: Option<&'a str>,
    pub trace_id: String,
}

/// Outbound invocation frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub arguments: Vec<TurnArguments>,
    pub invocation_id: String,
    pub target: &'static str,
    #[serde(rename = "type")]
    pub kind: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnArguments {
    pub source: &'static str,
    pub options_sets: Vec<&'static str>,
    pub allowed_message_types: Vec<&'static str>,
    pub slice_ids: Vec<&'static str>,
    pub trace_id: String,
    pub is_start_of_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    pub message: OutboundMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_signature: Option<String>,
    pub participant: Participant,
    pub conversation_id: String,
    /// Omitted entirely when empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub previous_messages: Vec<ContextEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_image_url: Option<String>,
    pub author: &'static str,
    pub text: String,
    pub message_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    pub author: &'static str,
    pub description: String,
    pub context_type: &'static str,
    pub message_type: &'static str,
    pub message_id: &'static str,
}

impl ContextEntry {
    fn page(description: String) -> Self {
        Self {
            author: "user",
            description,
            context_type: "WebPage",
            message_type: "Context",
            message_id: CONTEXT_MESSAGE_ID,
        }
    }
}

impl TurnRequest {
    /// Serializes and terminates the frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        Ok(super::frame::encode_frame(&value))
    }
}

/// Builds the invocation frame for one turn.
pub fn build_turn_request(params: &TurnRequestParams<'_>) -> TurnRequest {
    let text = if params.continuation {
        CONTINUE_INSTRUCTION.to_string()
    } else {
        params.text.to_string()
    };

    let previous_messages = params
        .context
        .iter()
        .filter(|c| !c.is_empty())
        .cloned()
        .map(ContextEntry::page)
        .collect();

    let arguments = TurnArguments {
        source: "cib",
        options_sets: params.dialect.option_sets(),
        allowed_message_types: ALLOWED_MESSAGE_TYPES.to_vec(),
        slice_ids: SLICE_IDS.to_vec(),
        trace_id: params.trace_id.clone(),
        is_start_of_session: params.invocation_id == 0,
        locale: params.locale.map(str::to_string),
        market: params.locale.map(str::to_string),
        message: OutboundMessage {
            image_url: params.image.map(UploadedImage::image_url),
            original_image_url: params.image.map(UploadedImage::original_image_url),
            author: "user",
            text,
            message_type: "Chat",
        },
        conversation_signature: params.session.body_signature().map(str::to_string),
        participant: Participant {
            id: params.session.client_id.clone(),
        },
        conversation_id: params.session.conversation_id.clone(),
        previous_messages,
    };

    TurnRequest {
        arguments: vec![arguments],
        invocation_id: params.invocation_id.to_string(),
        target: "chat",
        kind: 4,
    }
}
