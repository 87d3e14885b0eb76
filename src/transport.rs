//! WebSocket transport
//!
//! A [`Session`] is one live connection, presented as a pair of channels:
//! frames to write and frames (or the terminal error) read. The WebSocket
//! implementation pumps both directions in background tasks so reading and
//! writing never wait on each other.

use crate::error::{ConnectError, RecvError, SendError};
use crate::protocol::Frame;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const OUTGOING_CAPACITY: usize = 32;
const INCOMING_CAPACITY: usize = 64;

/// Interval between client pings
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Silence after which the connection is considered dead
const IDLE_TIMEOUT: Duration = Duration::from_secs(65);

/// Something that can open sessions to an endpoint
pub trait Transport: Send + Sync + 'static {
    /// Open a session, failing with [`ConnectError::Timeout`] if the
    /// handshake does not finish within `timeout`
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Session, ConnectError>>;
}

/// Write half of a session, cheap to clone
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Frame>,
}

impl FrameSender {
    /// Queue a frame, waiting at most `timeout` for room
    pub async fn send(&self, frame: Frame, timeout: Duration) -> Result<(), SendError> {
        self.tx
            .send_timeout(frame, timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => SendError::Timeout,
                mpsc::error::SendTimeoutError::Closed(_) => SendError::NotConnected,
            })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One open connection
pub struct Session {
    outgoing: FrameSender,
    incoming: mpsc::Receiver<Result<Frame, RecvError>>,
    close_tx: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
}

impl Session {
    /// Build a session over existing channels
    ///
    /// The transport on the other end reads `outgoing` and feeds `incoming`,
    /// ending it with `Err(RecvError)` when the connection goes away.
    pub fn new(
        outgoing: mpsc::Sender<Frame>,
        incoming: mpsc::Receiver<Result<Frame, RecvError>>,
    ) -> Self {
        Self {
            outgoing: FrameSender { tx: outgoing },
            incoming,
            close_tx: None,
            reader: None,
        }
    }

    pub fn sender(&self) -> FrameSender {
        self.outgoing.clone()
    }

    pub async fn send(&self, frame: Frame, timeout: Duration) -> Result<(), SendError> {
        self.outgoing.send(frame, timeout).await
    }

    /// Wait for the next frame
    pub async fn receive(&mut self) -> Result<Frame, RecvError> {
        match self.incoming.recv().await {
            Some(item) => item,
            None => Err(RecvError::Broken("transport stopped".to_string())),
        }
    }

    /// Close the connection; calling this again does nothing
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.incoming.close();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Transport over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Session, ConnectError>> {
        Box::pin(connect_ws(endpoint, timeout))
    }
}

async fn connect_ws(endpoint: &str, timeout: Duration) -> Result<Session, ConnectError> {
    tracing::info!("Connecting to {}", endpoint);

    let (ws_stream, _) = match tokio::time::timeout(timeout, connect_async(endpoint)).await {
        Err(_) => return Err(ConnectError::Timeout),
        Ok(Err(e)) => return Err(ConnectError::Refused(e.to_string())),
        Ok(Ok(pair)) => pair,
    };
    let (mut write, mut read) = ws_stream.split();

    let (out_tx, mut out_rx) = mpsc::channel::<Frame>(OUTGOING_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel::<Result<Frame, RecvError>>(INCOMING_CAPACITY);
    let (close_tx, mut close_rx) = oneshot::channel::<()>();

    // Forward outgoing frames and keepalive pings to the socket
    tokio::spawn(async move {
        let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
        keepalive.tick().await;

        loop {
            tokio::select! {
                frame = out_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = write.send(Message::Text(frame.into_string())).await {
                        tracing::warn!("Failed to send frame: {}", e);
                        break;
                    }
                }
                _ = keepalive.tick() => {
                    if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                        tracing::warn!("Failed to send keepalive: {}", e);
                        break;
                    }
                }
                _ = &mut close_rx => break,
            }
        }

        let _ = write.close().await;
        tracing::debug!("Writer task finished");
    });

    // Read frames until the connection ends; the terminal error is delivered last
    let reader = tokio::spawn(async move {
        loop {
            let item = match tokio::time::timeout(IDLE_TIMEOUT, read.next()).await {
                Err(_) => Err(RecvError::Broken("keepalive timeout".to_string())),
                Ok(Some(Ok(Message::Text(text)))) => Ok(Frame::from(text)),
                Ok(Some(Ok(Message::Close(frame)))) => {
                    tracing::info!("WebSocket closed by peer: {:?}", frame);
                    Err(RecvError::Closed)
                }
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(e))) => Err(RecvError::Broken(e.to_string())),
                Ok(None) => Err(RecvError::Broken("stream ended without close frame".to_string())),
            };

            let done = item.is_err();
            if in_tx.send(item).await.is_err() || done {
                break;
            }
        }
    });

    Ok(Session {
        outgoing: FrameSender { tx: out_tx },
        incoming: in_rx,
        close_tx: Some(close_tx),
        reader: Some(reader),
    })
}
