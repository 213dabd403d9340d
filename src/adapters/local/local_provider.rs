//! Local Completion Provider - `CompletionProvider` for a local
//! `/v1/chat/completions` server.
//!
//! # Streaming
//!
//! Streaming responses are server-sent events. Each `data:` event carries one
//! incremental token in `choices[0].delta.content` until a literal `[DONE]`.
//! Some servers close the connection without sending `[DONE]`; that close is
//! treated as the end of the reply. `ping` events and empty data are skipped.

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, Response};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::time::Duration;

use super::sse::{SseDecoder, SseEvent};
use crate::config::LocalLlmConfig;
use crate::ports::{
    ChatMessage, ChunkStream, CompletionError, CompletionProvider, CompletionRequest,
    CompletionResponse, FinishReason, ProviderInfo, StreamChunk,
};

/// Configuration for the local provider.
#[derive(Debug, Clone)]
pub struct LocalProviderConfig {
    /// Full completion endpoint URL.
    pub completions_url: String,
    /// Extra headers sent with every request.
    pub headers: HashMap<String, String>,
    pub connect_timeout: Duration,
}

impl LocalProviderConfig {
    pub fn new(completions_url: impl Into<String>) -> Self {
        Self {
            completions_url: completions_url.into(),
            headers: HashMap::new(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Adds an extra request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl From<&LocalLlmConfig> for LocalProviderConfig {
    fn from(config: &LocalLlmConfig) -> Self {
        Self {
            completions_url: config.completions_url(),
            headers: config.headers.clone(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Provider for a local chat-completion server.
pub struct LocalCompletionProvider {
    config: LocalProviderConfig,
    client: Client,
}

impl LocalCompletionProvider {
    /// Creates a provider. Local models can take minutes before the first
    /// token, so only the connect phase is bounded.
    pub fn new(config: LocalProviderConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| CompletionError::InvalidRequest(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn to_wire_request<'a>(&self, request: &'a CompletionRequest, stream: bool) -> WireRequest<'a> {
        WireRequest {
            messages: &request.messages,
            stream,
            temperature: request.temperature,
            top_p: request.top_p,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
            max_tokens: request.max_tokens,
            stop: &request.stop,
        }
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<Response, CompletionError> {
        let mut builder = self
            .client
            .post(&self.config.completions_url)
            .header("Content-Type", "application/json")
            .json(&self.to_wire_request(request, stream));
        for (name, value) in &self.config.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        tracing::debug!(url = %self.config.completions_url, stream, messages = request.messages.len(), "sending completion request");

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                CompletionError::Timeout {
                    timeout_secs: self.config.connect_timeout.as_secs(),
                }
            } else if e.is_connect() {
                CompletionError::network(format!("Connection failed: {}", e))
            } else {
                CompletionError::network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::http(status.as_u16(), body));
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for LocalCompletionProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        let response = self.send(&request, false).await?;
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CompletionError::parse(format!("Failed to parse response: {}", e)))?;
        parse_completion(raw)
    }

    async fn stream_complete(&self, request: CompletionRequest) -> Result<ChunkStream, CompletionError> {
        let response = self.send(&request, true).await?;
        let body = response.bytes_stream().map(|chunk| chunk.map(|bytes| bytes.to_vec()));
        Ok(Box::pin(sse_chunks(body)))
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo::new("local", &self.config.completions_url).with_streaming(true)
    }
}

fn parse_completion(raw: serde_json::Value) -> Result<CompletionResponse, CompletionError> {
    let choice = raw
        .pointer("/choices/0")
        .ok_or_else(|| CompletionError::parse("No choices in response"))?;
    let content = choice
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| CompletionError::parse("No message content in response"))?
        .to_string();
    let finish_reason = choice
        .get("finish_reason")
        .and_then(|r| r.as_str())
        .map(FinishReason::from_wire)
        .unwrap_or(FinishReason::Stop);
    let model = raw.get("model").and_then(|m| m.as_str()).map(str::to_string);

    Ok(CompletionResponse {
        content,
        model,
        finish_reason,
        raw,
    })
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send>>;

struct SseState {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamChunk, CompletionError>>,
    finished: bool,
}

impl SseState {
    fn handle(&mut self, event: SseEvent) {
        if self.finished || event.data.is_empty() || event.event.as_deref() == Some("ping") {
            return;
        }
        if event.data == "[DONE]" {
            self.finish(FinishReason::Stop);
            return;
        }
        match parse_delta(&event.data) {
            Ok(Some(token)) => self.pending.push_back(Ok(StreamChunk::content(token))),
            // The first event usually has no content.
            Ok(None) => {}
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }

    fn finish(&mut self, reason: FinishReason) {
        self.pending.push_back(Ok(StreamChunk::final_chunk(reason)));
        self.finished = true;
    }
}

fn parse_delta(data: &str) -> Result<Option<String>, CompletionError> {
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| CompletionError::parse(format!("Failed to parse SSE chunk: {}", e)))?;
    Ok(value
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(str::to_string))
}

/// Turns an SSE byte stream into completion chunks, always ending with a
/// final chunk unless an error ends it first.
fn sse_chunks<S>(body: S) -> impl Stream<Item = Result<StreamChunk, CompletionError>> + Send
where
    S: Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    for event in state.decoder.push(&bytes) {
                        state.handle(event);
                    }
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(CompletionError::network(format!("Stream error: {}", e))));
                    state.finished = true;
                }
                None => {
                    if let Some(event) = state.decoder.finish() {
                        state.handle(event);
                    }
                    if !state.finished {
                        tracing::debug!("server closed the stream without [DONE]");
                        state.finish(FinishReason::Closed);
                    }
                }
            }
        }
    })
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::Role;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> LocalCompletionProvider {
        let config = LocalProviderConfig::new(format!("{}/v1/chat/completions", server.uri()))
            .with_header("x-api-key", "secret");
        LocalCompletionProvider::new(config).unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new()
            .with_message(Role::System, "Be brief")
            .with_message(Role::User, "Hi")
            .with_max_tokens(500)
            .with_stop(vec!["### Instruction: ".to_string()])
    }

    async fn collect(stream: ChunkStream) -> Vec<Result<StreamChunk, CompletionError>> {
        stream.collect().await
    }

    fn delta(token: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": token}}]})
        )
    }

    #[tokio::test]
    async fn complete_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("x-api-key", "secret"))
            .and(body_partial_json(serde_json::json!({
                "stream": false,
                "max_tokens": 500,
                "messages": [{"role": "system", "content": "Be brief"}, {"role": "user", "content": "Hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama",
                "choices": [{"message": {"role": "assistant", "content": " Hello! "}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server).complete(request()).await.unwrap();

        assert_eq!(response.content, " Hello! ");
        assert_eq!(response.model.as_deref(), Some("llama"));
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.raw["model"], "llama");
    }

    #[tokio::test]
    async fn non_200_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
            .mount(&server)
            .await;

        let err = provider(&server).complete(request()).await.unwrap_err();

        assert!(matches!(err, CompletionError::Http { status: 503, .. }));
        assert!(err.to_string().contains("model loading"));
    }

    #[tokio::test]
    async fn stream_concatenates_tokens_until_done() {
        let server = MockServer::start().await;
        let body = format!(
            "data: {}\n\nevent: ping\ndata: {{}}\n\n{}{}data: [DONE]\n\n{}",
            serde_json::json!({"choices": [{"delta": {"role": "assistant"}}]}),
            delta("Hel"),
            delta("lo"),
            delta("ignored")
        );
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let chunks = collect(provider(&server).stream_complete(request()).await.unwrap()).await;
        let chunks: Vec<StreamChunk> = chunks.into_iter().map(Result::unwrap).collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].delta, "Hel");
        assert_eq!(chunks[1].delta, "lo");
        assert_eq!(chunks[2].finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn stream_close_without_done_is_implicit_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(delta("partial")),
            )
            .mount(&server)
            .await;

        let chunks = collect(provider(&server).stream_complete(request()).await.unwrap()).await;
        let chunks: Vec<StreamChunk> = chunks.into_iter().map(Result::unwrap).collect();

        assert_eq!(chunks[0].delta, "partial");
        assert_eq!(chunks.last().unwrap().finish_reason, Some(FinishReason::Closed));
    }

    #[tokio::test]
    async fn malformed_event_is_parse_error() {
        let chunks: Vec<_> = sse_chunks(stream::iter(vec![Ok(b"data: {nope\n\n".to_vec())]))
            .collect()
            .await;

        assert_eq!(chunks.len(), 1);
        assert!(matches!(chunks[0], Err(CompletionError::Parse(_))));
    }

    #[test]
    fn wire_request_skips_unset_parameters() {
        let config = LocalProviderConfig::new("http://localhost:3002/v1/chat/completions");
        let provider = LocalCompletionProvider::new(config).unwrap();
        let request = CompletionRequest::new().with_message(Role::User, "Hi");

        let json = serde_json::to_value(provider.to_wire_request(&request, true)).unwrap();

        assert_eq!(json["stream"], true);
        assert!(json.get("top_p").is_none());
        assert!(json.get("stop").is_none());
    }
}
