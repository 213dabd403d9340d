//! WebSocket Channel - the `HubChannel` over a tokio-tungstenite stream.
//!
//! The socket is split: the read half stays with the channel, the write half
//! moves into a writer task fed by an unbounded queue, so the heartbeat and
//! the turn request can write while the turn loop reads.

use async_trait::async_trait;
use futures::stream::{SplitStream, StreamExt};
use futures::SinkExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::ports::{HubChannel, HubError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `close()` waits for the close frame to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Duplex channel backed by a WebSocket connection.
pub struct WebSocketChannel {
    reader: SplitStream<Socket>,
    outbound: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
    writer: JoinHandle<()>,
    closed: bool,
}

impl WebSocketChannel {
    pub fn new(socket: Socket) -> Self {
        let (mut sink, reader) = socket.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<String>();
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();

        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    next = queue.recv() => match next {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::Text(text.into())).await {
                                tracing::debug!(error = %e, "channel write failed");
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            let _ = sink.close().await;
        });

        Self {
            reader,
            outbound,
            shutdown,
            writer,
            closed: false,
        }
    }
}

#[async_trait]
impl HubChannel for WebSocketChannel {
    fn outbound(&self) -> mpsc::UnboundedSender<String> {
        self.outbound.clone()
    }

    async fn next_text(&mut self) -> Option<Result<String, HubError>> {
        while let Some(message) = self.reader.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => tracing::debug!("dropping non-UTF-8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "peer closed channel");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(HubError::transport(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shutdown.cancel();
        if tokio::time::timeout(CLOSE_GRACE, &mut self.writer).await.is_err() {
            self.writer.abort();
        }
        tracing::debug!("channel closed");
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.writer.abort();
    }
}
