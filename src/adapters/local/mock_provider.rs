//! Mock Completion Provider for testing.
//!
//! Replays queued replies without a server. Streaming replies are split into
//! the configured tokens, so callers can assert on incremental progress.

use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{
    ChunkStream, CompletionError, CompletionProvider, CompletionRequest, CompletionResponse,
    FinishReason, ProviderInfo, StreamChunk,
};

/// Mock completion provider.
#[derive(Debug, Clone)]
pub struct MockCompletionProvider {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    delay: Duration,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

/// A configured mock reply.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Reply made of these tokens, streamed one per chunk.
    Tokens {
        tokens: Vec<String>,
        finish_reason: FinishReason,
    },
    Error(MockError),
}

/// Mock error types.
#[derive(Debug, Clone)]
pub enum MockError {
    Http { status: u16, body: String },
    Network { message: String },
    Timeout { timeout_secs: u64 },
}

impl From<MockError> for CompletionError {
    fn from(err: MockError) -> Self {
        match err {
            MockError::Http { status, body } => CompletionError::http(status, body),
            MockError::Network { message } => CompletionError::network(message),
            MockError::Timeout { timeout_secs } => CompletionError::Timeout { timeout_secs },
        }
    }
}

impl Default for MockCompletionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompletionProvider {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queues a reply delivered as a single token.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.with_tokens(&[&content.into()])
    }

    /// Queues a reply delivered token by token.
    pub fn with_tokens(self, tokens: &[&str]) -> Self {
        self.push(MockResponse::Tokens {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            finish_reason: FinishReason::Stop,
        })
    }

    /// Queues an error.
    pub fn with_error(self, error: MockError) -> Self {
        self.push(MockResponse::Error(error))
    }

    /// Sets simulated latency per request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Returns all recorded requests.
    pub fn get_calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn push(self, response: MockResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    async fn begin(&self, request: CompletionRequest) -> MockResponse {
        self.calls.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockResponse::Tokens {
                tokens: vec!["Mock response".to_string()],
                finish_reason: FinishReason::Stop,
            })
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        match self.begin(request).await {
            MockResponse::Tokens { tokens, finish_reason } => {
                let content = tokens.concat();
                Ok(CompletionResponse {
                    raw: serde_json::json!({
                        "model": "mock",
                        "choices": [{"message": {"role": "assistant", "content": content}}]
                    }),
                    content,
                    model: Some("mock".to_string()),
                    finish_reason,
                })
            }
            MockResponse::Error(err) => Err(err.into()),
        }
    }

    async fn stream_complete(&self, request: CompletionRequest) -> Result<ChunkStream, CompletionError> {
        match self.begin(request).await {
            MockResponse::Tokens { tokens, finish_reason } => {
                let chunks: Vec<Result<StreamChunk, CompletionError>> = tokens
                    .into_iter()
                    .map(|t| Ok(StreamChunk::content(t)))
                    .chain(std::iter::once(Ok(StreamChunk::final_chunk(finish_reason))))
                    .collect();
                Ok(Box::pin(stream::iter(chunks)))
            }
            MockResponse::Error(err) => Err(err.into()),
        }
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo::new("mock", "mock://completions")
    }
}
