//! Hub protocol domain: dialect, framing, events and request building.
//!
//! Nothing in this module performs I/O.

mod dialect;
mod event;
mod frame;
mod request;
mod session;

pub use dialect::{AccountTier, DialectSettings, Persona, Plugin, PluginSet, ToneStyle};
pub use event::{
    BotMessage, CompletionItem, HubEvent, ResultInfo, BOT_AUTHOR, INVALID_SESSION,
    TELEMETRY_MESSAGE_TYPES,
};
pub use frame::{
    decode_frames, encode_frame, handshake_frame, heartbeat_frame, is_handshake_ack,
    RECORD_SEPARATOR,
};
pub use request::{
    build_turn_request, continuation_transcript, format_context, new_trace_id, ContextEntry,
    OutboundMessage, Participant, TranscriptAuthor, TranscriptLine, TurnArguments, TurnRequest,
    TurnRequestParams, UploadedImage, CONTINUE_INSTRUCTION, IMAGE_BLOB_BASE,
};
pub use session::{SessionHandle, SessionSignature};
