//! Per-turn reconstruction state machine.
//!
//! The service streams the full accumulated reply text on every update rather
//! than a delta. [`TurnState`] derives deltas, latches the stop marker, forks
//! at most one side-channel asset request and resolves the final message
//! according to the completion priority rules.

use serde_json::Value;

use super::error::TurnError;
use super::phase::TurnPhase;
use super::reply::{AssetRequest, PendingReply};
use crate::domain::foundation::StateMachine;
use crate::domain::hub::{is_handshake_ack, BotMessage, CompletionItem, HubEvent, INVALID_SESSION};

/// Marker the model emits when it starts inventing the next user turn.
pub const STOP_TOKEN: &str = "\n\n[user](#message)";

/// Text used when moderation fires before any usable text arrived.
pub const MODERATION_PLACEHOLDER: &str =
    "[Error: The moderation filter triggered. Try again with different wording.]";

const DEFAULT_CLOSE_REASON: &str = "Connection closed with an error.";

/// What the driver should do after one frame unit.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameAction {
    /// The channel is open; start the heartbeat and send the turn.
    HandshakeComplete,
    /// Nothing to do.
    Ignore,
    /// Forward this delta to the progress listener.
    Progress(String),
    /// Start the side-channel asset task.
    ForkAsset(AssetRequest),
    /// The stream resolved; await the asset task if any, then finish.
    Complete(PendingReply),
}

/// Explicit state of one turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TurnState {
    phase: TurnPhase,
    reply_so_far: String,
    stop_token_found: bool,
    asset_forked: bool,
}

impl TurnState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Usable reply text accumulated so far.
    pub fn reply_so_far(&self) -> &str {
        &self.reply_so_far
    }

    pub fn stop_token_found(&self) -> bool {
        self.stop_token_found
    }

    pub fn asset_forked(&self) -> bool {
        self.asset_forked
    }

    /// Feeds one decoded frame unit.
    ///
    /// Errors are terminal: the phase moves to `Failed` and later units are
    /// ignored.
    pub fn apply(&mut self, unit: Value) -> Result<FrameAction, TurnError> {
        let result = match self.phase {
            TurnPhase::AwaitingHandshake => self.on_handshake(&unit),
            TurnPhase::Streaming => self.on_event(HubEvent::from_value(unit)),
            TurnPhase::Succeeded | TurnPhase::Failed => {
                tracing::debug!(phase = ?self.phase, "ignoring frame after resolution");
                return Ok(FrameAction::Ignore);
            }
        };

        match &result {
            Ok(FrameAction::HandshakeComplete) => self.advance(TurnPhase::Streaming),
            Ok(FrameAction::Complete(_)) => self.advance(TurnPhase::Succeeded),
            Err(_) => self.advance(TurnPhase::Failed),
            Ok(_) => {}
        }
        result
    }

    fn advance(&mut self, target: TurnPhase) {
        match self.phase.transition_to(target) {
            Ok(next) => self.phase = next,
            Err(e) => tracing::warn!(error = %e, "rejected turn phase transition"),
        }
    }

    fn on_handshake(&self, unit: &Value) -> Result<FrameAction, TurnError> {
        if is_handshake_ack(unit) {
            tracing::debug!("handshake established");
            Ok(FrameAction::HandshakeComplete)
        } else {
            Err(TurnError::ProtocolViolation(format!(
                "expected empty handshake acknowledgement, got {}",
                unit
            )))
        }
    }

    fn on_event(&mut self, event: HubEvent) -> Result<FrameAction, TurnError> {
        match event {
            HubEvent::Update { messages } => Ok(self.on_update(messages)),
            HubEvent::Completion(item) => self.on_completion(item),
            HubEvent::Close { error } => Err(TurnError::ConnectionClosed {
                reason: error.unwrap_or_else(|| DEFAULT_CLOSE_REASON.to_string()),
            }),
            HubEvent::Other {
                kind,
                error: Some(error),
            } => Err(TurnError::UnexpectedEvent {
                kind: kind.map_or_else(|| "undefined".to_string(), |k| k.to_string()),
                error,
            }),
            HubEvent::Other { .. } => Ok(FrameAction::Ignore),
        }
    }

    fn on_update(&mut self, messages: Vec<BotMessage>) -> FrameAction {
        if self.stop_token_found {
            return FrameAction::Ignore;
        }
        let Some(first) = messages.into_iter().next() else {
            return FrameAction::Ignore;
        };
        if !first.is_from_bot() {
            return FrameAction::Ignore;
        }

        if first.is_image() {
            if self.asset_forked {
                tracing::warn!("ignoring second image placeholder in one turn");
                return FrameAction::Ignore;
            }
            self.asset_forked = true;
            return FrameAction::ForkAsset(AssetRequest {
                prompt: first.text().unwrap_or_default().to_string(),
                message_id: first.message_id().map(str::to_string),
            });
        }

        if first.is_telemetry() {
            return FrameAction::Ignore;
        }

        let updated = first.text().unwrap_or_default();
        if updated.is_empty() || updated == self.reply_so_far {
            return FrameAction::Ignore;
        }

        if updated.trim().ends_with(STOP_TOKEN) {
            self.stop_token_found = true;
            let stripped = updated.replacen(STOP_TOKEN, "", 1).trim().to_string();
            let delta = delta_between(&self.reply_so_far, &stripped);
            tracing::debug!("stop token latched");
            self.reply_so_far = stripped;
            return progress(delta);
        }

        let delta = delta_between(&self.reply_so_far, updated);
        if !first.is_moderated() {
            self.reply_so_far = updated.to_string();
        }
        progress(delta)
    }

    fn on_completion(&mut self, item: CompletionItem) -> Result<FrameAction, TurnError> {
        if item.result_value() == Some(INVALID_SESSION) {
            return Err(TurnError::InvalidSession {
                message: item.result_message().unwrap_or_default().to_string(),
            });
        }

        let moderation_signalled = item.moderation_signalled();
        let has_error = item.has_error();
        let code = item.result_value().map(str::to_string);
        let remote_message = item.result_message().map(str::to_string);
        let conversation_expiry_time = item.conversation_expiry_time;
        let message = self.select_final(item.messages);

        if has_error {
            if let Some(mut message) = message.filter(|_| !self.reply_so_far.is_empty()) {
                tracing::warn!(
                    code = code.as_deref().unwrap_or("unknown"),
                    "recovering result error with partial reply"
                );
                message.set_text(&self.reply_so_far);
                return Ok(FrameAction::Complete(PendingReply {
                    message,
                    conversation_expiry_time,
                    moderated: false,
                    degraded: true,
                    asset_expected: self.asset_forked,
                }));
            }
            return Err(TurnError::Remote {
                code: code.unwrap_or_else(|| "UnknownError".to_string()),
                message: remote_message.unwrap_or_default(),
            });
        }

        let Some(mut message) = message else {
            return Err(TurnError::NoMessageGenerated);
        };
        if !message.is_from_bot() {
            return Err(TurnError::UnexpectedAuthor {
                author: message.author().map(str::to_string),
            });
        }

        let moderated = self.stop_token_found || moderation_signalled;
        if moderated {
            let text = if self.reply_so_far.is_empty() {
                MODERATION_PLACEHOLDER
            } else {
                self.reply_so_far.as_str()
            };
            message.set_text(text);
            message.strip_suggestions();
        }

        Ok(FrameAction::Complete(PendingReply {
            message,
            conversation_expiry_time,
            moderated,
            degraded: false,
            asset_expected: self.asset_forked,
        }))
    }

    /// The last message, or when an asset was forked the last message that is
    /// not an image placeholder (never walking past the first).
    fn select_final(&self, messages: Vec<BotMessage>) -> Option<BotMessage> {
        let mut index = messages.len().checked_sub(1)?;
        if self.asset_forked {
            while index > 0 && messages[index].is_image() {
                index -= 1;
            }
        }
        messages.into_iter().nth(index)
    }
}

fn progress(delta: String) -> FrameAction {
    if delta.is_empty() {
        FrameAction::Ignore
    } else {
        FrameAction::Progress(delta)
    }
}

/// Text added by `updated` over `previous`.
///
/// When `updated` does not extend `previous`, the characters past the previous
/// length are taken, matching how the service rewrites its own snapshots.
pub fn delta_between(previous: &str, updated: &str) -> String {
    match updated.strip_prefix(previous) {
        Some(rest) => rest.to_string(),
        None => updated.chars().skip(previous.chars().count()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reconstruct::{AssetOutcome, CompletedReply};
    use proptest::prelude::*;
    use serde_json::json;

    fn streaming() -> TurnState {
        let mut state = TurnState::new();
        assert_eq!(state.apply(json!({})), Ok(FrameAction::HandshakeComplete));
        state
    }

    fn update(text: &str) -> Value {
        json!({"type": 1, "arguments": [{"messages": [{"author": "bot", "text": text}]}]})
    }

    fn update_with(message: Value) -> Value {
        json!({"type": 1, "arguments": [{"messages": [message]}]})
    }

    fn completion(messages: Value) -> Value {
        json!({"type": 2, "item": {"messages": messages, "result": {"value": "Success"}}})
    }

    fn bot(text: &str) -> Value {
        json!({
            "author": "bot",
            "text": text,
            "adaptiveCards": [{"body": [{"text": text}]}],
            "suggestedResponses": [{"text": "More?"}]
        })
    }

    fn finish(action: FrameAction) -> CompletedReply {
        match action {
            FrameAction::Complete(pending) => pending.finish(None),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn handshake_must_be_empty_object() {
        let mut state = TurnState::new();
        let err = state.apply(json!({"type": 1})).unwrap_err();
        assert!(matches!(err, TurnError::ProtocolViolation(_)));
        assert_eq!(state.phase(), TurnPhase::Failed);
    }

    #[test]
    fn hel_hello_example() {
        let mut state = streaming();
        assert_eq!(state.apply(update("Hel")), Ok(FrameAction::Progress("Hel".into())));
        assert_eq!(state.apply(update("Hello")), Ok(FrameAction::Progress("lo".into())));
        let reply = finish(state.apply(completion(json!([bot("Hello")]))).unwrap());

        assert_eq!(reply.text, "Hello");
        assert!(!reply.moderated);
        assert_eq!(state.phase(), TurnPhase::Succeeded);
    }

    #[test]
    fn repeated_and_empty_updates_are_ignored() {
        let mut state = streaming();
        state.apply(update("Hi")).unwrap();
        assert_eq!(state.apply(update("Hi")), Ok(FrameAction::Ignore));
        assert_eq!(state.apply(update("")), Ok(FrameAction::Ignore));
    }

    #[test]
    fn non_bot_and_telemetry_updates_are_filtered() {
        let mut state = streaming();
        assert_eq!(
            state.apply(update_with(json!({"author": "user", "text": "echo"}))),
            Ok(FrameAction::Ignore)
        );
        assert_eq!(
            state.apply(update_with(json!({
                "author": "bot",
                "text": "Searching the web for: rust",
                "messageType": "InternalSearchQuery"
            }))),
            Ok(FrameAction::Ignore)
        );
        assert_eq!(state.reply_so_far(), "");
    }

    #[test]
    fn stop_token_latches_and_is_stripped() {
        let mut state = streaming();
        state.apply(update("Sure thing")).unwrap();
        let action = state.apply(update("Sure thing.\n\n[user](#message)")).unwrap();

        assert_eq!(action, FrameAction::Progress(".".into()));
        assert!(state.stop_token_found());
        assert_eq!(state.reply_so_far(), "Sure thing.");

        assert_eq!(
            state.apply(update("Sure thing.\n\n[user](#message)\nWhat else")),
            Ok(FrameAction::Ignore)
        );
        assert_eq!(state.reply_so_far(), "Sure thing.");
    }

    #[test]
    fn stop_token_forces_moderated_completion() {
        let mut state = streaming();
        state.apply(update("Answer\n\n[user](#message)")).unwrap();
        let reply = finish(
            state
                .apply(completion(json!([bot("Answer\n\n[user](#message) more")])))
                .unwrap(),
        );

        assert!(reply.moderated);
        assert_eq!(reply.text, "Answer");
        assert!(reply.message.as_value().get("suggestedResponses").is_none());
    }

    #[test]
    fn moderated_update_emits_but_does_not_accumulate() {
        let mut state = streaming();
        state.apply(update("Part one")).unwrap();
        let action = state
            .apply(update_with(json!({
                "author": "bot",
                "text": "Part one, sorry",
                "offense": "OffenseTrigger"
            })))
            .unwrap();

        assert_eq!(action, FrameAction::Progress(", sorry".into()));
        assert_eq!(state.reply_so_far(), "Part one");
    }

    #[test]
    fn invalid_session_always_fails() {
        let mut state = streaming();
        state.apply(update("Some text")).unwrap();
        let err = state
            .apply(json!({
                "type": 2,
                "item": {
                    "messages": [bot("Some text")],
                    "result": {"value": "InvalidSession", "message": "Session expired", "error": "x"}
                }
            }))
            .unwrap_err();

        assert_eq!(err, TurnError::InvalidSession { message: "Session expired".into() });
    }

    #[test]
    fn result_error_with_partial_text_degrades() {
        let mut state = streaming();
        state.apply(update("Partial answer")).unwrap();
        let reply = finish(
            state
                .apply(json!({
                    "type": 2,
                    "item": {
                        "messages": [bot("")],
                        "result": {"value": "Throttled", "message": "Slow down", "error": "Throttled"}
                    }
                }))
                .unwrap(),
        );

        assert!(reply.degraded);
        assert_eq!(reply.text, "Partial answer");
        assert_eq!(
            reply.message.as_value()["adaptiveCards"][0]["body"][0]["text"],
            "Partial answer"
        );
    }

    #[test]
    fn throttled_without_text_raises_tagged_error() {
        let mut state = streaming();
        let err = state
            .apply(json!({
                "type": 2,
                "item": {"result": {"value": "Throttled", "message": "Request is throttled.", "error": "Throttled"}}
            }))
            .unwrap_err();

        assert_eq!(
            err,
            TurnError::Remote {
                code: "Throttled".into(),
                message: "Request is throttled.".into()
            }
        );
        assert_eq!(state.phase(), TurnPhase::Failed);
    }

    #[test]
    fn completion_without_messages_fails() {
        let mut state = streaming();
        let err = state.apply(completion(json!([]))).unwrap_err();
        assert_eq!(err, TurnError::NoMessageGenerated);
    }

    #[test]
    fn completion_from_wrong_author_fails() {
        let mut state = streaming();
        let err = state
            .apply(completion(json!([{"author": "user", "text": "hi"}])))
            .unwrap_err();
        assert_eq!(err, TurnError::UnexpectedAuthor { author: Some("user".into()) });
    }

    #[test]
    fn topic_changer_without_text_uses_placeholder() {
        let mut state = streaming();
        let reply = finish(
            state
                .apply(completion(json!([{
                    "author": "bot",
                    "text": "Let's talk about something else",
                    "topicChangerText": "New topic"
                }])))
                .unwrap(),
        );
        assert!(reply.moderated);
        assert_eq!(reply.text, MODERATION_PLACEHOLDER);
    }

    #[test]
    fn apology_on_second_message_triggers_moderation() {
        let mut state = streaming();
        state.apply(update("I was saying")).unwrap();
        let reply = finish(
            state
                .apply(completion(json!([
                    bot("I was saying"),
                    {"author": "bot", "text": "Sorry!", "contentOrigin": "Apology"}
                ])))
                .unwrap(),
        );
        assert!(reply.moderated);
        assert_eq!(reply.text, "I was saying");
    }

    #[test]
    fn close_event_carries_reason() {
        let mut state = streaming();
        assert_eq!(
            state.apply(json!({"type": 7})).unwrap_err(),
            TurnError::ConnectionClosed { reason: DEFAULT_CLOSE_REASON.into() }
        );

        let mut state = streaming();
        assert_eq!(
            state.apply(json!({"type": 7, "error": "Going away"})).unwrap_err(),
            TurnError::ConnectionClosed { reason: "Going away".into() }
        );
    }

    #[test]
    fn unknown_event_with_error_fails_and_without_is_ignored() {
        let mut state = streaming();
        assert_eq!(state.apply(json!({"type": 6})), Ok(FrameAction::Ignore));
        assert_eq!(
            state.apply(json!({"type": 3, "error": "boom"})).unwrap_err(),
            TurnError::UnexpectedEvent { kind: "3".into(), error: "boom".into() }
        );
    }

    #[test]
    fn frames_after_resolution_are_ignored() {
        let mut state = streaming();
        state.apply(json!({"type": 7})).unwrap_err();
        assert_eq!(state.apply(update("late")), Ok(FrameAction::Ignore));
    }

    #[test]
    fn image_placeholder_forks_once_and_final_skips_it() {
        let mut state = streaming();
        state.apply(update("Drawing")).unwrap();
        let image = json!({"author": "bot", "contentType": "IMAGE", "text": "a red fox", "messageId": "m-1"});

        assert_eq!(
            state.apply(update_with(image.clone())),
            Ok(FrameAction::ForkAsset(AssetRequest {
                prompt: "a red fox".into(),
                message_id: Some("m-1".into())
            }))
        );
        assert_eq!(state.apply(update_with(image.clone())), Ok(FrameAction::Ignore));

        let action = state
            .apply(completion(json!([bot("Drawing a fox for you"), image])))
            .unwrap();
        let FrameAction::Complete(pending) = action else {
            panic!("expected completion");
        };
        assert!(pending.awaits_asset());
        assert_eq!(pending.message().text(), Some("Drawing a fox for you"));

        let reply = pending.finish(Some(AssetOutcome::Rendered("<img/>".into())));
        assert_eq!(reply.text, "Drawing a fox for you<img/>");
    }

    #[test]
    fn delta_handles_rewritten_snapshots() {
        assert_eq!(delta_between("Hel", "Hello"), "lo");
        assert_eq!(delta_between("Hallo", "Hello!"), "!");
        assert_eq!(delta_between("héllo", "hallo wörld"), " wörld");
        assert_eq!(delta_between("longer text", "short"), "");
    }

    proptest! {
        #[test]
        fn deltas_concatenate_to_final_text(
            chunks in prop::collection::vec("[a-zA-Z0-9 ,.!éß]{1,6}", 1..20),
            repeats in prop::collection::vec(any::<bool>(), 20),
        ) {
            let mut state = streaming();
            let mut accumulated = String::new();
            let mut emitted = String::new();

            for (i, chunk) in chunks.iter().enumerate() {
                accumulated.push_str(chunk);
                let times = if repeats[i] { 2 } else { 1 };
                for _ in 0..times {
                    if let FrameAction::Progress(delta) = state.apply(update(&accumulated)).unwrap() {
                        emitted.push_str(&delta);
                    }
                }
            }

            prop_assert_eq!(&emitted, &accumulated);
            prop_assert_eq!(state.reply_so_far(), accumulated.as_str());
        }

        #[test]
        fn nothing_changes_after_stop_latch(
            prefix in "[a-z][a-z ]{0,11}",
            tails in prop::collection::vec("[a-z ]{0,8}", 1..6),
        ) {
            let mut state = streaming();
            let stopped = format!("{}{}", prefix, STOP_TOKEN);
            state.apply(update(&stopped)).unwrap();
            let latched = state.reply_so_far().to_string();

            for tail in tails {
                let later = format!("{}{}", stopped, tail);
                prop_assert_eq!(state.apply(update(&later)).unwrap(), FrameAction::Ignore);
                prop_assert_eq!(state.reply_so_far(), latched.as_str());
            }
        }
    }
}
