//! chathub - one prompt per stdin line, replies streamed to stdout.
//!
//! Configuration comes from the environment (`CHATHUB__...`); set
//! `CHATHUB__MODE=local` to talk to a local completion server instead of the hub.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use chathub_client::adapters::hub::{HttpHubConnector, HttpImageUploader, HubConnectionConfig};
use chathub_client::adapters::local::{LocalCompletionProvider, LocalProviderConfig};
use chathub_client::adapters::storage::{
    FileConversationStore, InMemoryConversationStore, RedisConversationStore,
};
use chathub_client::application::{
    HubClient, LocalChatClient, LocalTurnOptions, ReplyEnvelope, TurnOptions,
};
use chathub_client::config::{AppConfig, ClientMode, StorageBackend, StorageConfig};
use chathub_client::domain::foundation::{ConversationKey, MessageId};
use chathub_client::ports::{ConversationStore, ProgressListener};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    config.logging.init()?;
    config.validate().context("invalid configuration")?;

    let printer: Arc<dyn ProgressListener> = Arc::new(|text: &str| {
        print!("{}", text);
        let _ = std::io::stdout().flush();
    });

    match config.mode {
        ClientMode::Hub => {
            let store = build_store(&config.storage, "bing").await?;
            run_hub(config, store, printer).await
        }
        ClientMode::Local => {
            let store = build_store(&config.storage, "local").await?;
            run_local(config, store, printer).await
        }
    }
}

async fn build_store(config: &StorageConfig, namespace: &str) -> Result<Arc<dyn ConversationStore>> {
    let namespace = config.namespace_or(namespace);
    let store: Arc<dyn ConversationStore> = match config.backend {
        StorageBackend::Memory => Arc::new(InMemoryConversationStore::new()),
        StorageBackend::File => Arc::new(FileConversationStore::new(&config.path, namespace)),
        StorageBackend::Redis => {
            let url = config.redis_url.as_deref().context("storage.redis_url is required")?;
            Arc::new(
                RedisConversationStore::connect(url, namespace)
                    .await?
                    .with_ttl(config.ttl()),
            )
        }
    };
    tracing::info!(backend = ?config.backend, namespace, "conversation store ready");
    Ok(store)
}

/// Cancels the returned token on Ctrl-C until the guard is aborted.
fn cancel_on_ctrl_c() -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let guard = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    (token, guard)
}

async fn run_hub(config: AppConfig, store: Arc<dyn ConversationStore>, printer: Arc<dyn ProgressListener>) -> Result<()> {
    let connector = HttpHubConnector::new(HubConnectionConfig::from(&config.hub))?;
    let uploader = HttpImageUploader::from_config(&config.hub)?;
    let client = HubClient::new(config.hub, Arc::new(connector), store).with_uploader(Arc::new(uploader));

    let mut previous: Option<ReplyEnvelope> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let (token, guard) = cancel_on_ctrl_c();
        let mut options = TurnOptions::new().with_progress(printer.clone()).with_cancel(token);
        if let Some(reply) = &previous {
            options = options
                .with_session(&reply.session)
                .with_invocation_id(reply.invocation_id)
                .with_parent(reply.message_id);
        }

        let result = client.send_message(text, options).await;
        guard.abort();
        println!();
        match result {
            Ok(reply) => previous = Some(reply),
            Err(e) => {
                eprintln!("error [{}]: {}", e.code(), e);
                // A dead session cannot be resumed.
                if !e.is_retryable() {
                    previous = None;
                }
            }
        }
    }
    Ok(())
}

async fn run_local(config: AppConfig, store: Arc<dyn ConversationStore>, printer: Arc<dyn ProgressListener>) -> Result<()> {
    let provider = LocalCompletionProvider::new(LocalProviderConfig::from(&config.local))?;
    let client = LocalChatClient::new(config.local, Arc::new(provider), store);

    let mut thread: Option<(ConversationKey, MessageId)> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let (token, guard) = cancel_on_ctrl_c();
        let mut options = LocalTurnOptions::new().with_progress(printer.clone()).with_cancel(token);
        if let Some((key, parent)) = &thread {
            options = options.with_conversation(key.clone()).with_parent(*parent);
        }

        let result = client.send_message(text, options).await;
        guard.abort();
        println!();
        match result {
            Ok(reply) => thread = Some((reply.conversation_id, reply.message_id)),
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}
