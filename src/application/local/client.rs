//! Local chat client: the same threading contract over a completion server.
//!
//! A new conversation is seeded with the configured system message, whose id
//! is the parent of the first user message. The prompt is the ancestor chain
//! of the new user message. Replies stream token by token when streaming is
//! enabled and the caller listens for progress.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::application::turn_locks::TurnLocks;
use crate::config::LocalLlmConfig;
use crate::domain::conversation::{Conversation, Message, Role};
use crate::domain::foundation::{ConversationKey, MessageId};
use crate::ports::{
    ChatMessage, CompletionError, CompletionProvider, CompletionRequest, ConversationStore,
    ProgressListener,
};

/// Per-call options for `LocalChatClient::send_message`.
#[derive(Clone, Default)]
pub struct LocalTurnOptions {
    /// Existing conversation; a fresh key is generated when absent.
    pub conversation_id: Option<ConversationKey>,
    pub parent_message_id: Option<MessageId>,
    pub progress: Option<Arc<dyn ProgressListener>>,
    pub cancel: Option<CancellationToken>,
}

impl LocalTurnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversation(mut self, key: ConversationKey) -> Self {
        self.conversation_id = Some(key);
        self
    }

    pub fn with_parent(mut self, parent: MessageId) -> Self {
        self.parent_message_id = Some(parent);
        self
    }

    pub fn with_progress(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.progress = Some(listener);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl fmt::Debug for LocalTurnOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTurnOptions")
            .field("conversation_id", &self.conversation_id)
            .field("parent_message_id", &self.parent_message_id)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

/// Result of a local turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalReplyEnvelope {
    pub text: String,
    pub conversation_id: ConversationKey,
    /// Id of the stored user message.
    pub parent_message_id: MessageId,
    pub message_id: MessageId,
    /// Raw server response; empty for streamed replies.
    pub details: serde_json::Value,
}

/// Client for a local chat-completion server.
pub struct LocalChatClient {
    config: LocalLlmConfig,
    provider: Arc<dyn CompletionProvider>,
    store: Arc<dyn ConversationStore>,
    locks: TurnLocks,
}

impl LocalChatClient {
    pub fn new(
        config: LocalLlmConfig,
        provider: Arc<dyn CompletionProvider>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            config,
            provider,
            store,
            locks: TurnLocks::new(),
        }
    }

    /// Sends `text` and waits for the full reply.
    pub async fn send_message(
        &self,
        text: &str,
        options: LocalTurnOptions,
    ) -> Result<LocalReplyEnvelope, CompletionError> {
        let cancel = options.cancel.clone().unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(CompletionError::Cancelled);
        }

        let key = options.conversation_id.clone().unwrap_or_else(ConversationKey::generate);
        let parent = options.parent_message_id.unwrap_or_default();

        let _turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
            guard = self.locks.acquire(&key) => guard,
        };
        let loaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
            loaded = self.store.get(&key) => loaded?,
        };
        let mut conversation = match loaded {
            Some(conversation) => conversation,
            None => {
                let mut conversation = Conversation::new();
                conversation.push(Message::system(self.config.system_message.as_str(), None).with_id(parent));
                conversation
            }
        };

        let user_message = Message::user(text, Some(parent));
        let user_message_id = user_message.id();
        conversation.push(user_message);

        let request = self.build_request(&conversation, user_message_id);
        tracing::info!(conversation_id = %key, messages = request.messages.len(), "sending local turn");

        let (reply, details) = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CompletionError::Cancelled),
            result = self.generate(request, options.progress.clone()) => result,
        }?;
        let reply = reply.trim().to_string();

        let reply_message = Message::assistant(reply.as_str(), Some(user_message_id));
        let message_id = reply_message.id();
        conversation.push(reply_message);
        self.store.set(&key, &conversation).await?;

        Ok(LocalReplyEnvelope {
            text: reply,
            conversation_id: key,
            parent_message_id: user_message_id,
            message_id,
            details,
        })
    }

    fn build_request(&self, conversation: &Conversation, leaf: MessageId) -> CompletionRequest {
        let chain = conversation.ancestor_chain(leaf);
        let mut messages: Vec<ChatMessage> = chain
            .iter()
            .map(|m| ChatMessage::new(m.role(), m.text()))
            .collect();
        // Regenerating the first message leaves the user message alone.
        if messages.len() == 1 {
            messages.insert(0, ChatMessage::new(Role::System, self.config.system_message.as_str()));
        }

        let config = &self.config;
        CompletionRequest {
            messages,
            ..CompletionRequest::default()
        }
        .with_max_tokens(config.max_tokens)
        .with_temperature(config.temperature)
        .with_top_p(config.top_p)
        .with_presence_penalty(Some(config.presence_penalty))
        .with_frequency_penalty(config.frequency_penalty)
        .with_stop(config.stop.clone())
    }

    async fn generate(
        &self,
        request: CompletionRequest,
        progress: Option<Arc<dyn ProgressListener>>,
    ) -> Result<(String, serde_json::Value), CompletionError> {
        match progress.filter(|_| self.config.stream) {
            Some(progress) => {
                let mut stream = self.provider.stream_complete(request).await?;
                let mut reply = String::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    if chunk.is_final() {
                        tracing::debug!(finish_reason = ?chunk.finish_reason, "local stream finished");
                        break;
                    }
                    progress.on_progress(&chunk.delta);
                    reply.push_str(&chunk.delta);
                }
                Ok((reply, serde_json::json!({})))
            }
            None => {
                let response = self.provider.complete(request).await?;
                Ok((response.content, response.raw))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::{MockCompletionProvider, MockError};
    use crate::adapters::storage::InMemoryConversationStore;
    use std::sync::Mutex;

    fn client(provider: MockCompletionProvider, stream: bool) -> (LocalChatClient, InMemoryConversationStore) {
        let store = InMemoryConversationStore::new();
        let config = LocalLlmConfig {
            system_message: "You are a helpful assistant.".into(),
            stream,
            ..LocalLlmConfig::default()
        };
        (
            LocalChatClient::new(config, Arc::new(provider), Arc::new(store.clone())),
            store,
        )
    }

    #[tokio::test]
    async fn first_turn_seeds_system_message_with_parent_id() {
        let provider = MockCompletionProvider::new().with_response("  Hello!  ");
        let (client, store) = client(provider.clone(), true);
        let parent = MessageId::new();

        let reply = client
            .send_message("Hi", LocalTurnOptions::new().with_parent(parent))
            .await
            .unwrap();

        assert_eq!(reply.text, "Hello!");
        let conversation = store.get(&reply.conversation_id).await.unwrap().unwrap();
        let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(conversation.messages()[0].id(), parent);

        let request = &provider.get_calls()[0];
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].content, "You are a helpful assistant.");
        assert_eq!(request.max_tokens, Some(500));
        assert_eq!(request.stop, vec!["### Instruction: "]);
    }

    #[tokio::test]
    async fn streams_tokens_when_listening() {
        let provider = MockCompletionProvider::new().with_tokens(&["Hel", "lo", " "]);
        let (client, _) = client(provider, true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let reply = client
            .send_message(
                "Hi",
                LocalTurnOptions::new()
                    .with_progress(Arc::new(move |t: &str| sink.lock().unwrap().push(t.to_string()))),
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["Hel", "lo", " "]);
        assert_eq!(reply.text, "Hello");
        assert_eq!(reply.details, serde_json::json!({}));
    }

    #[tokio::test]
    async fn non_streaming_returns_raw_details() {
        let provider = MockCompletionProvider::new().with_response("Done");
        let (client, _) = client(provider, false);

        let reply = client
            .send_message("Hi", LocalTurnOptions::new().with_progress(Arc::new(|_: &str| {})))
            .await
            .unwrap();

        assert_eq!(reply.details["model"], "mock");
    }

    #[tokio::test]
    async fn second_turn_replays_ancestor_chain() {
        let provider = MockCompletionProvider::new().with_response("One").with_response("Two");
        let (client, _) = client(provider.clone(), false);

        let first = client.send_message("First", LocalTurnOptions::new()).await.unwrap();
        client
            .send_message(
                "Second",
                LocalTurnOptions::new()
                    .with_conversation(first.conversation_id.clone())
                    .with_parent(first.message_id),
            )
            .await
            .unwrap();

        let contents: Vec<String> = provider.get_calls()[1]
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(contents, vec!["You are a helpful assistant.", "First", "One", "Second"]);
    }

    #[tokio::test]
    async fn orphan_user_message_gets_fresh_system_prompt() {
        let provider = MockCompletionProvider::new().with_response("One").with_response("Again");
        let (client, _) = client(provider.clone(), false);

        let first = client.send_message("First", LocalTurnOptions::new()).await.unwrap();
        client
            .send_message(
                "Regenerate",
                LocalTurnOptions::new()
                    .with_conversation(first.conversation_id.clone())
                    .with_parent(MessageId::new()),
            )
            .await
            .unwrap();

        let request = &provider.get_calls()[1];
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content, "Regenerate");
    }

    #[tokio::test]
    async fn provider_errors_are_not_persisted() {
        let provider = MockCompletionProvider::new().with_error(MockError::Http {
            status: 500,
            body: "boom".into(),
        });
        let (client, store) = client(provider, false);
        let key = ConversationKey::generate();

        let err = client
            .send_message("Hi", LocalTurnOptions::new().with_conversation(key.clone()))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to send message. HTTP 500 - boom");
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelled_turn_is_rejected() {
        let provider = MockCompletionProvider::new()
            .with_delay(std::time::Duration::from_secs(5))
            .with_response("late");
        let (client, _) = client(provider, false);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client
            .send_message("Hi", LocalTurnOptions::new().with_cancel(token))
            .await
            .unwrap_err();

        assert!(matches!(err, CompletionError::Cancelled));
    }

    #[tokio::test]
    async fn turn_waiting_on_busy_conversation_can_be_cancelled() {
        let provider = MockCompletionProvider::new()
            .with_delay(std::time::Duration::from_secs(3))
            .with_response("slow")
            .with_response("never");
        let (client, _) = client(provider.clone(), false);
        let client = Arc::new(client);
        let key = ConversationKey::generate();

        let busy = {
            let client = client.clone();
            let key = key.clone();
            tokio::spawn(async move {
                client
                    .send_message("First", LocalTurnOptions::new().with_conversation(key))
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = client
            .send_message("Second", LocalTurnOptions::new().with_conversation(key).with_cancel(token))
            .await
            .unwrap_err();

        assert!(matches!(err, CompletionError::Cancelled));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(provider.call_count(), 1);
        busy.abort();
    }
}
