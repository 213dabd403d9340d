//! Scripted Hub Connector for testing.
//!
//! Replays canned inbound traffic instead of talking to the service, and
//! records what the client sent and how often it closed channels.
//!
//! # Example
//!
//! ```ignore
//! let connector = ScriptedHubConnector::new().with_script(
//!     ChannelScript::new()
//!         .handshake()
//!         .frame(json!({"type": 1, "arguments": [{"messages": [{"author": "bot", "text": "Hi"}]}]}))
//!         .frame(json!({"type": 2, "item": {"messages": [{"author": "bot", "text": "Hi"}]}})),
//! );
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::domain::hub::{encode_frame, SessionHandle, SessionSignature};
use crate::ports::{HubChannel, HubConnector, HubError};

/// One scripted inbound event.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Deliver raw text as one transport message.
    Text(String),
    /// Pause before the next step.
    Delay(Duration),
    /// Fail the read with a transport error.
    Fail(HubError),
    /// Never deliver anything again.
    Hang,
}

/// Inbound traffic for one channel. When the steps run out the peer closes.
#[derive(Debug, Clone, Default)]
pub struct ChannelScript {
    steps: Vec<ScriptStep>,
}

impl ChannelScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the handshake acknowledgement.
    pub fn handshake(self) -> Self {
        self.frame(Value::Object(Default::default()))
    }

    /// Appends one record-terminated JSON frame.
    pub fn frame(self, value: Value) -> Self {
        self.text(encode_frame(&value))
    }

    /// Appends raw text, delivered as a single transport message.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Text(text.into()));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.steps.push(ScriptStep::Delay(delay));
        self
    }

    pub fn fail(mut self, error: HubError) -> Self {
        self.steps.push(ScriptStep::Fail(error));
        self
    }

    pub fn hang(mut self) -> Self {
        self.steps.push(ScriptStep::Hang);
        self
    }
}

/// Observations shared between the connector, its channels and the test.
#[derive(Debug, Clone, Default)]
pub struct ScriptProbe {
    inner: Arc<ProbeInner>,
}

#[derive(Debug, Default)]
struct ProbeInner {
    sessions_created: AtomicUsize,
    connects: AtomicUsize,
    closes: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

impl ScriptProbe {
    /// Number of sessions negotiated.
    pub fn sessions_created(&self) -> usize {
        self.inner.sessions_created.load(Ordering::SeqCst)
    }

    /// Number of channels opened.
    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Number of channels closed. Repeated `close()` calls on one channel
    /// count once.
    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Raw outbound text observed so far, across all channels.
    pub fn sent(&self) -> Vec<String> {
        self.inner.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Outbound frames parsed as JSON, record separators stripped.
    pub fn sent_frames(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .flat_map(|text| crate::domain::hub::decode_frames(text))
            .collect()
    }

    fn record(&self, text: String) {
        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text);
    }
}

/// Hub connector that serves scripted sessions and channels.
#[derive(Debug, Default)]
pub struct ScriptedHubConnector {
    sessions: Mutex<VecDeque<Result<SessionHandle, HubError>>>,
    scripts: Mutex<VecDeque<ChannelScript>>,
    probe: ScriptProbe,
}

impl ScriptedHubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next `create_session` call. Without queued
    /// results sessions are generated.
    pub fn with_session(self, session: Result<SessionHandle, HubError>) -> Self {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(session);
        self
    }

    /// Queues the script for the next opened channel.
    pub fn with_script(self, script: ChannelScript) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(script);
        self
    }

    pub fn probe(&self) -> ScriptProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl HubConnector for ScriptedHubConnector {
    async fn create_session(&self) -> Result<SessionHandle, HubError> {
        let n = self.probe.inner.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
        let queued = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        queued.unwrap_or_else(|| {
            Ok(SessionHandle::new(
                format!("conversation-{}", n),
                format!("client-{}", n),
                SessionSignature::Plain(format!("signature-{}", n)),
            ))
        })
    }

    async fn connect(&self, _session: &SessionHandle) -> Result<Box<dyn HubChannel>, HubError> {
        self.probe.inner.connects.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| HubError::transport("no scripted channel left"))?;
        Ok(Box::new(ScriptedChannel::new(script, self.probe.clone())))
    }
}

/// Channel replaying a `ChannelScript`.
pub struct ScriptedChannel {
    steps: VecDeque<ScriptStep>,
    outbound: mpsc::UnboundedSender<String>,
    sent: mpsc::UnboundedReceiver<String>,
    probe: ScriptProbe,
    closed: bool,
}

impl ScriptedChannel {
    pub fn new(script: ChannelScript, probe: ScriptProbe) -> Self {
        let (outbound, sent) = mpsc::unbounded_channel();
        Self {
            steps: script.steps.into(),
            outbound,
            sent,
            probe,
            closed: false,
        }
    }

    fn drain_sent(&mut self) {
        while let Ok(text) = self.sent.try_recv() {
            self.probe.record(text);
        }
    }
}

#[async_trait]
impl HubChannel for ScriptedChannel {
    fn outbound(&self) -> mpsc::UnboundedSender<String> {
        self.outbound.clone()
    }

    async fn next_text(&mut self) -> Option<Result<String, HubError>> {
        loop {
            self.drain_sent();
            if self.closed {
                return None;
            }
            match self.steps.pop_front()? {
                ScriptStep::Text(text) => return Some(Ok(text)),
                ScriptStep::Delay(delay) => tokio::time::sleep(delay).await,
                ScriptStep::Fail(error) => return Some(Err(error)),
                ScriptStep::Hang => std::future::pending::<()>().await,
            }
        }
    }

    async fn close(&mut self) {
        self.drain_sent();
        if self.closed {
            return;
        }
        self.closed = true;
        self.probe.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}
