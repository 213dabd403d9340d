//! Terminal reply values and side-channel asset splicing.

use crate::domain::hub::BotMessage;

/// Image generation request forked from a placeholder update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    pub prompt: String,
    pub message_id: Option<String>,
}

/// Resolution of the side-channel asset task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    /// Embeddable markup produced by the renderer.
    Rendered(String),
    /// Error text to annotate the reply with.
    Failed(String),
}

/// Final message accepted by the stream, waiting for the asset task.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReply {
    pub(super) message: BotMessage,
    pub(super) conversation_expiry_time: Option<String>,
    pub(super) moderated: bool,
    pub(super) degraded: bool,
    pub(super) asset_expected: bool,
}

impl PendingReply {
    /// True when an asset task was forked and must be awaited.
    pub fn awaits_asset(&self) -> bool {
        self.asset_expected
    }

    pub fn message(&self) -> &BotMessage {
        &self.message
    }

    /// Splices the asset outcome and freezes the reply.
    ///
    /// A forked task that produced nothing is reported as a failure so the
    /// reply always carries either the asset or an annotation.
    pub fn finish(self, asset: Option<AssetOutcome>) -> CompletedReply {
        let mut message = self.message;

        let asset = match (self.asset_expected, asset) {
            (true, None) => Some(AssetOutcome::Failed(
                "image generation did not complete".to_string(),
            )),
            (_, asset) => asset,
        };

        match asset {
            Some(AssetOutcome::Rendered(markup)) => message.append_text(&markup),
            Some(AssetOutcome::Failed(error)) => {
                let annotated = format!("{}<br>{}", message.text().unwrap_or_default(), error);
                message.set_text(&annotated);
            }
            None => {}
        }

        CompletedReply {
            text: message.text().unwrap_or_default().to_string(),
            message,
            conversation_expiry_time: self.conversation_expiry_time,
            moderated: self.moderated,
            degraded: self.degraded,
        }
    }
}

/// Fully resolved reply of a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedReply {
    pub text: String,
    pub message: BotMessage,
    pub conversation_expiry_time: Option<String>,
    /// The moderation filter replaced the service text.
    pub moderated: bool,
    /// A result-level error was recovered from partial text.
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending(asset_expected: bool) -> PendingReply {
        PendingReply {
            message: BotMessage::new(json!({
                "author": "bot",
                "text": "Here is your picture",
                "adaptiveCards": [{"body": [{"text": "Here is your picture"}]}]
            })),
            conversation_expiry_time: None,
            moderated: false,
            degraded: false,
            asset_expected,
        }
    }

    #[test]
    fn rendered_asset_is_appended() {
        let reply = pending(true).finish(Some(AssetOutcome::Rendered("<iframe/>".into())));
        assert_eq!(reply.text, "Here is your picture<iframe/>");
        assert_eq!(
            reply.message.as_value()["adaptiveCards"][0]["body"][0]["text"],
            "Here is your picture<iframe/>"
        );
    }

    #[test]
    fn failed_asset_is_annotated() {
        let reply = pending(true).finish(Some(AssetOutcome::Failed("blocked prompt".into())));
        assert_eq!(reply.text, "Here is your picture<br>blocked prompt");
        assert_eq!(
            reply.message.as_value()["adaptiveCards"][0]["body"][0]["text"],
            "Here is your picture<br>blocked prompt"
        );
    }

    #[test]
    fn missing_outcome_for_forked_task_is_annotated() {
        let reply = pending(true).finish(None);
        assert!(reply.text.contains("<br>"));
    }

    #[test]
    fn no_asset_leaves_text_alone() {
        let reply = pending(false).finish(None);
        assert_eq!(reply.text, "Here is your picture");
    }
}
