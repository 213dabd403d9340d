//! Hub client: runs one turn end to end.
//!
//! Negotiates or reuses a session, threads the conversation through the
//! store, opens a transport session, feeds inbound frames to `TurnState`
//! and persists the reply. The deadline and the cancellation token cover
//! everything from connect to resolution, and the transport is torn down
//! exactly once whichever way the turn ends.

use std::sync::Arc;

use serde::Serialize;

use super::asset_task::AssetTask;
use super::options::{Continuation, EffectiveOptions, ImageSource, TurnOptions};
use super::transport::{TransportSession, TransportSettings};
use crate::adapters::images::DisabledImageGenerator;
use crate::application::turn_locks::TurnLocks;
use crate::config::HubConfig;
use crate::domain::conversation::{Conversation, Message};
use crate::domain::foundation::{ConversationKey, MessageId};
use crate::domain::hub::{
    build_turn_request, continuation_transcript, format_context, new_trace_id, SessionHandle,
    TurnRequestParams, UploadedImage,
};
use crate::domain::reconstruct::{CompletedReply, FrameAction, TurnState};
use crate::ports::{ConversationStore, HubConnector, HubError, ImageGenerator, ImageUploader};

/// Result of a successful turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyEnvelope {
    /// Final reply text.
    pub text: String,
    /// The service's final message object, after moderation and asset splicing.
    pub details: serde_json::Value,
    /// Session to pass back for the next turn.
    pub session: SessionHandle,
    /// Invocation id for the next turn on this session.
    pub invocation_id: u32,
    pub conversation_expiry_time: Option<String>,
    /// Store key the turn was persisted under.
    pub conversation_key: ConversationKey,
    /// Id of the stored user message.
    pub parent_message_id: MessageId,
    /// Id of the stored reply; pass as the parent of the next turn.
    pub message_id: MessageId,
    pub moderated: bool,
    pub degraded: bool,
}

/// Client for the streaming chat hub.
pub struct HubClient {
    config: HubConfig,
    connector: Arc<dyn HubConnector>,
    store: Arc<dyn ConversationStore>,
    uploader: Option<Arc<dyn ImageUploader>>,
    generator: Arc<dyn ImageGenerator>,
    locks: TurnLocks,
}

impl HubClient {
    pub fn new(
        config: HubConfig,
        connector: Arc<dyn HubConnector>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            config,
            connector,
            store,
            uploader: None,
            generator: Arc::new(DisabledImageGenerator),
            locks: TurnLocks::new(),
        }
    }

    /// Enables image attachments.
    pub fn with_uploader(mut self, uploader: Arc<dyn ImageUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Sets the renderer for image placeholders.
    pub fn with_image_generator(mut self, generator: Arc<dyn ImageGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Sends `text` as one turn and waits for the reply.
    ///
    /// # Errors
    ///
    /// - `SessionCreationFailed` with the service's code when no session could be negotiated
    /// - `Timeout` when the turn deadline passes, `Cancelled` when the token fires
    /// - the stream failures of `TurnError`, converted
    /// - `Store` when the conversation cannot be loaded or saved
    pub async fn send_message(&self, text: &str, options: TurnOptions) -> Result<ReplyEnvelope, HubError> {
        let effective = EffectiveOptions::resolve(&self.config, &options);
        let cancel = effective.cancel.clone();
        if cancel.is_cancelled() {
            return Err(HubError::Cancelled);
        }

        let session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HubError::Cancelled),
            session = self.negotiate(&options) => session?,
        };

        let continuation = options.continuation.is_active();
        let (key, parent_message_id) = match &options.continuation {
            Continuation::Start => (
                ConversationKey::generate(),
                Some(options.parent_message_id.unwrap_or_default()),
            ),
            Continuation::Resume(key) => (key.clone(), options.parent_message_id),
            Continuation::Off => (
                ConversationKey::new(session.conversation_id.as_str())
                    .map_err(|e| HubError::ProtocolViolation(e.to_string()))?,
                options.parent_message_id,
            ),
        };

        // Waiting on another turn for the same key, the store and the upload all yield to the token.
        let _turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HubError::Cancelled),
            guard = self.locks.acquire(&key) => guard,
        };
        let mut conversation = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HubError::Cancelled),
            loaded = self.store.get(&key) => loaded?.unwrap_or_default(),
        };

        let context = if continuation {
            // The transcript is only replayed at the start of a session.
            (options.invocation_id == 0)
                .then(|| replay_context(&conversation, parent_message_id, text, &effective))
                .flatten()
        } else {
            effective.context.clone().filter(|c| !c.is_empty())
        };

        let user_message = Message::user(text, parent_message_id);
        let user_message_id = user_message.id();
        conversation.push(user_message);

        let image = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HubError::Cancelled),
            image = self.resolve_image(options.image.as_ref()) => image,
        };

        let request = build_turn_request(&TurnRequestParams {
            text,
            session: &session,
            invocation_id: options.invocation_id,
            dialect: effective.dialect,
            continuation,
            context,
            image: image.as_ref(),
            locale: effective.locale.as_deref(),
            trace_id: new_trace_id(),
        });
        let frame = request
            .to_frame()
            .map_err(|e| HubError::ProtocolViolation(format!("failed to encode turn request: {}", e)))?;

        tracing::info!(
            conversation_key = %key,
            invocation_id = options.invocation_id,
            continuation,
            tone = %effective.dialect.tone,
            "sending turn"
        );

        let mut transport = None;
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HubError::Cancelled),
            result = tokio::time::timeout(
                effective.turn_timeout,
                self.run_turn(&mut transport, &session, frame, &effective),
            ) => result.unwrap_or_else(|_| Err(HubError::Timeout {
                secs: effective.turn_timeout.as_secs(),
            })),
        };
        if let Some(mut transport) = transport.take() {
            transport.teardown().await;
        }

        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(conversation_key = %key, code = e.code(), error = %e, "turn failed");
                return Err(e);
            }
        };

        let reply_message = Message::assistant(reply.text.as_str(), Some(user_message_id))
            .with_details(reply.message.as_value().clone());
        let message_id = reply_message.id();
        conversation.push(reply_message);
        self.store.set(&key, &conversation).await?;

        tracing::info!(
            conversation_key = %key,
            moderated = reply.moderated,
            degraded = reply.degraded,
            "turn complete"
        );

        let CompletedReply {
            text,
            message,
            conversation_expiry_time,
            moderated,
            degraded,
        } = reply;
        Ok(ReplyEnvelope {
            text,
            details: message.into_value(),
            session,
            invocation_id: options.invocation_id + 1,
            conversation_expiry_time,
            conversation_key: key,
            parent_message_id: user_message_id,
            message_id,
            moderated,
            degraded,
        })
    }

    async fn negotiate(&self, options: &TurnOptions) -> Result<SessionHandle, HubError> {
        if !options.continuation.is_active() {
            if let Some(session) = options.session() {
                return Ok(session);
            }
        }
        let session = self.connector.create_session().await?;
        tracing::debug!(conversation_id = %session.conversation_id, "negotiated session");
        Ok(session)
    }

    /// Upload failures drop the image instead of failing the turn.
    async fn resolve_image(&self, source: Option<&ImageSource>) -> Option<UploadedImage> {
        let source = source?;
        let Some(uploader) = &self.uploader else {
            tracing::warn!("image attached but no uploader configured, sending without it");
            return None;
        };

        let uploaded = async {
            let encoded = match source {
                ImageSource::Url(url) => uploader.fetch_base64(url).await?,
                ImageSource::Base64(data) => data.clone(),
            };
            uploader.upload(&encoded).await
        }
        .await;

        match uploaded {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::warn!(error = %e, "image upload failed, sending without it");
                None
            }
        }
    }

    /// Connects, handshakes, sends and reconstructs. The transport is left in
    /// `slot` so the caller can tear it down even if this future is dropped.
    async fn run_turn(
        &self,
        slot: &mut Option<TransportSession>,
        session: &SessionHandle,
        frame: String,
        effective: &EffectiveOptions,
    ) -> Result<CompletedReply, HubError> {
        let settings = TransportSettings {
            heartbeat_interval: effective.heartbeat_interval,
            liveness_timeout: effective.liveness_timeout,
        };
        let transport = slot.insert(TransportSession::connect(self.connector.as_ref(), session, settings).await?);

        let mut state = TurnState::new();
        transport.handshake(&mut state).await?;
        transport.send(frame)?;

        let mut asset: Option<AssetTask> = None;
        loop {
            for unit in transport.next_units().await? {
                match state.apply(unit)? {
                    FrameAction::Progress(delta) => effective.progress.on_progress(&delta),
                    FrameAction::ForkAsset(request) => {
                        asset = Some(AssetTask::spawn(
                            self.generator.clone(),
                            request,
                            effective.progress.clone(),
                        ));
                    }
                    FrameAction::Complete(pending) => {
                        let outcome = match asset.take() {
                            Some(task) => Some(task.outcome().await),
                            None => None,
                        };
                        return Ok(pending.finish(outcome));
                    }
                    FrameAction::HandshakeComplete | FrameAction::Ignore => {}
                }
            }
        }
    }
}

/// Context string replayed at the start of a locally threaded session.
fn replay_context(
    conversation: &Conversation,
    parent: Option<MessageId>,
    text: &str,
    effective: &EffectiveOptions,
) -> Option<String> {
    let window = parent.map(|p| conversation.ancestor_chain(p)).unwrap_or_default();
    let transcript = continuation_transcript(effective.system_message.as_deref(), &window, text);
    format_context(&transcript, effective.context.as_deref())
}
