//! Plot results and error types.
//!
//! A failed document send is not an exceptional condition for the
//! transport, but it is for the caller: a stale chart must never look
//! current. [`PlotError::LostConnection`] carries the full
//! [`PlotReport`] so the caller can decide whether to reopen the page or
//! restart the server.

use std::time::Duration;

use chrono::{DateTime, Utc};
use pushviz_protocol::CodecError;
use pushviz_transport::{ChannelInfo, SendError, TransportError, TransportServer};
use serde::Serialize;

/// Snapshot of the running listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub port: u16,
    pub url: String,
    pub started_at: DateTime<Utc>,
}

impl From<&TransportServer> for ServerInfo {
    fn from(server: &TransportServer) -> Self {
        Self {
            port: server.port(),
            url: server.url(),
            started_at: server.started_at(),
        }
    }
}

/// What a `plot` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotReport {
    pub port: u16,
    pub server: ServerInfo,
    /// The channel the document was handed to, if any was registered
    pub channel: Option<ChannelInfo>,
    pub send_succeeded: bool,
    /// Why the document send failed
    pub failure: Option<SendError>,
}

/// Errors from starting the listener.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The listener is up, but no browser completed a handshake in time.
    #[error("no browser connected to {url} within {timeout:?}")]
    HandshakeTimeout { url: String, timeout: Duration },

    /// `stop` was called while waiting for the browser.
    #[error("server at {url} was stopped before a browser connected")]
    Cancelled { url: String },
}

/// Errors returned by `plot` and `plot_on`.
///
/// Once a listener is up every failure is a [`PlotError::LostConnection`],
/// including a browser that never connected. `Server` only covers a
/// listener that could not be bound at all.
#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    /// The document did not reach the browser; whatever it shows is stale.
    #[error("lost connection to the browser on port {}: {}", .0.port, describe_failure(.0))]
    LostConnection(PlotReport),

    #[error("pushviz server unavailable: {0}")]
    Server(#[from] ServerError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl PlotError {
    /// The report attached to a lost connection.
    pub fn report(&self) -> Option<&PlotReport> {
        match self {
            Self::LostConnection(report) => Some(report),
            _ => None,
        }
    }
}

fn describe_failure(report: &PlotReport) -> String {
    report
        .failure
        .as_ref()
        .map_or_else(|| "send failed".to_string(), ToString::to_string)
}
