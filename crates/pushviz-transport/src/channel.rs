//! Browser channel handles.
//!
//! A [`BrowserChannel`] is the sending half of one WebSocket connection.
//! The socket itself is owned by the connection task, which drains a
//! [`ChannelReceiver`] and acknowledges every write. A send therefore
//! resolves once the frame has been handed to the socket, or fails if the
//! connection task is gone.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Why a frame did not reach the browser's transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SendError {
    /// No browser has completed a handshake (or the last one was cleared).
    #[error("no browser channel is registered")]
    NoChannel,

    /// The connection task has exited; the tab was closed or superseded.
    #[error("browser channel {id} is closed")]
    Closed { id: String },

    /// The socket rejected the write.
    #[error("write to browser channel {id} failed: {reason}")]
    Write { id: String, reason: String },
}

/// Snapshot of a channel for reports and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub id: String,
    pub connected_at: DateTime<Utc>,
}

/// A text frame waiting to be written, plus the acknowledgement slot.
#[derive(Debug)]
pub struct PendingSend {
    payload: String,
    ack: oneshot::Sender<Result<(), String>>,
}

impl PendingSend {
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Report the outcome of the socket write back to the sender.
    pub fn complete(self, result: Result<(), String>) {
        let _ = self.ack.send(result);
    }
}

/// Commands consumed by the connection task.
#[derive(Debug)]
pub enum Outbound {
    Send(PendingSend),
    Close,
}

/// Receiving half handed to whoever owns the socket.
#[derive(Debug)]
pub struct ChannelReceiver {
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl ChannelReceiver {
    /// Next command, or `None` once every [`BrowserChannel`] clone is dropped.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }
}

/// Handle to one live browser connection.
#[derive(Debug)]
pub struct BrowserChannel {
    id: String,
    connected_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl BrowserChannel {
    /// Create a channel and the receiver its connection task will drain.
    pub fn new() -> (Self, ChannelReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            id: uuid::Uuid::new_v4().to_string(),
            connected_at: Utc::now(),
            tx,
        };
        (channel, ChannelReceiver { rx })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.id.clone(),
            connected_at: self.connected_at,
        }
    }

    /// Whether the connection task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Hand a text frame to the socket and wait for the write to finish.
    pub async fn send_text(&self, payload: String) -> Result<(), SendError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Outbound::Send(PendingSend { payload, ack }))
            .map_err(|_| self.closed())?;

        match done.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(SendError::Write {
                id: self.id.clone(),
                reason,
            }),
            // Task dropped the pending send without answering.
            Err(_) => Err(self.closed()),
        }
    }

    /// Ask the connection task to send a close frame and exit.
    pub fn close(&self) {
        if self.tx.send(Outbound::Close).is_ok() {
            debug!("Closing browser channel {}", self.id);
        }
    }

    fn closed(&self) -> SendError {
        SendError::Closed {
            id: self.id.clone(),
        }
    }
}
