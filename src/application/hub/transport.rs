//! Transport session: one open channel carrying one turn.
//!
//! Owns the channel and the heartbeat task. `teardown` releases both and is
//! safe to call more than once; dropping an un-torn-down session still stops
//! the heartbeat.

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::hub::{decode_frames, handshake_frame, heartbeat_frame, SessionHandle};
use crate::domain::reconstruct::{FrameAction, TurnState};
use crate::ports::{HubChannel, HubConnector, HubError};

const PEER_CLOSED: &str = "Connection closed before the turn completed.";

/// Timing of an open channel.
#[derive(Debug, Clone, Copy)]
pub struct TransportSettings {
    /// Zero disables the heartbeat.
    pub heartbeat_interval: Duration,
    /// Longest allowed inbound silence, if any.
    pub liveness_timeout: Option<Duration>,
}

/// An open duplex channel plus its heartbeat.
pub struct TransportSession {
    channel: Box<dyn HubChannel>,
    outbound: mpsc::UnboundedSender<String>,
    settings: TransportSettings,
    heartbeat: Option<JoinHandle<()>>,
    pending: VecDeque<Value>,
    torn_down: bool,
}

impl TransportSession {
    /// Opens the channel for `session`. No frames are exchanged yet.
    pub async fn connect(
        connector: &dyn HubConnector,
        session: &SessionHandle,
        settings: TransportSettings,
    ) -> Result<Self, HubError> {
        let channel = connector.connect(session).await?;
        let outbound = channel.outbound();
        tracing::debug!(conversation_id = %session.conversation_id, "channel open");
        Ok(Self {
            channel,
            outbound,
            settings,
            heartbeat: None,
            pending: VecDeque::new(),
            torn_down: false,
        })
    }

    /// Sends the capability frame and waits for the acknowledgement, then
    /// starts the heartbeat. Units batched after the acknowledgement are kept
    /// for [`next_units`](Self::next_units).
    pub async fn handshake(&mut self, state: &mut TurnState) -> Result<(), HubError> {
        self.send(handshake_frame())?;
        loop {
            let mut units = self.read_units().await?;
            while let Some(unit) = units.pop_front() {
                if state.apply(unit)? == FrameAction::HandshakeComplete {
                    self.pending.extend(units);
                    self.start_heartbeat();
                    return Ok(());
                }
            }
        }
    }

    /// Queues raw record-terminated text for the writer.
    pub fn send(&self, text: String) -> Result<(), HubError> {
        self.outbound
            .send(text)
            .map_err(|_| HubError::ConnectionClosed {
                reason: PEER_CLOSED.to_string(),
            })
    }

    /// Next batch of decoded units. A peer close mid-turn is an error.
    pub async fn next_units(&mut self) -> Result<VecDeque<Value>, HubError> {
        if !self.pending.is_empty() {
            return Ok(std::mem::take(&mut self.pending));
        }
        self.read_units().await
    }

    async fn read_units(&mut self) -> Result<VecDeque<Value>, HubError> {
        let next = match self.settings.liveness_timeout {
            Some(limit) => tokio::time::timeout(limit, self.channel.next_text())
                .await
                .map_err(|_| {
                    tracing::warn!(secs = limit.as_secs_f64(), "no inbound traffic, giving up on peer");
                    HubError::Timeout { secs: limit.as_secs() }
                })?,
            None => self.channel.next_text().await,
        };
        match next {
            Some(Ok(text)) => Ok(decode_frames(&text).into()),
            Some(Err(e)) => Err(e),
            None => Err(HubError::ConnectionClosed {
                reason: PEER_CLOSED.to_string(),
            }),
        }
    }

    fn start_heartbeat(&mut self) {
        let interval = self.settings.heartbeat_interval;
        if interval.is_zero() || self.heartbeat.is_some() {
            return;
        }
        let outbound = self.outbound.clone();
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                if outbound.send(heartbeat_frame()).is_err() {
                    break;
                }
            }
        }));
    }

    /// Stops the heartbeat and closes the channel.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        self.channel.close().await;
        tracing::debug!("transport torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        if !self.torn_down {
            tracing::warn!("transport dropped without teardown");
        }
    }
}
