//! Session state machine for the single visualization slot.
//!
//! ```text
//! Ready ──dispatch──▶ Loading ──▶ Served(D) ──dispatch──▶ Loading ──▶ Served(D') ...
//! ```
//!
//! Every dispatch shows the Loading placeholder before the document, so a
//! slow render never leaves the previous chart on screen looking current.
//! `Served(D)` is entered whether or not D actually reached the browser:
//! it records what was last attempted, for inspection after a failure.

use parking_lot::Mutex;
use pushviz_protocol::{CodecError, Document, Placeholder};
use pushviz_transport::{BrowserChannel, SendError};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Whether the last document reached the browser's transport.
pub type Delivery = Result<(), SendError>;

/// What the browser is (supposed to be) showing.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Ready,
    Loading,
    Served(Document),
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Ready => Phase::Ready,
            Self::Loading => Phase::Loading,
            Self::Served(_) => Phase::Served,
        }
    }
}

/// Document-free view of [`SessionState`], broadcast on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Ready,
    Loading,
    Served,
}

pub struct Session {
    state: Mutex<SessionState>,
    /// Most recent document handed to a channel; survives restarts.
    last_served: Mutex<Option<Document>>,
    /// Keeps one dispatch's Loading/document pair from interleaving with another's.
    dispatch_lock: tokio::sync::Mutex<()>,
    phases: broadcast::Sender<Phase>,
}

impl Session {
    pub fn new() -> Self {
        let (phases, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(SessionState::Ready),
            last_served: Mutex::new(None),
            dispatch_lock: tokio::sync::Mutex::new(()),
            phases,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn last_served(&self) -> Option<Document> {
        self.last_served.lock().clone()
    }

    /// Receive every phase transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Phase> {
        self.phases.subscribe()
    }

    /// Return to `Ready` after a fresh server start. Nothing is sent.
    pub fn reset(&self) {
        self.transition(SessionState::Ready);
    }

    /// Push the Ready placeholder to a newly connected browser.
    pub async fn show_ready(&self, channel: Option<&BrowserChannel>) -> Result<Delivery, CodecError> {
        let payload = Placeholder::Ready.document().encode()?;
        let _guard = self.dispatch_lock.lock().await;
        Ok(push(channel, payload).await)
    }

    /// Show Loading, then `doc`, through `channel`.
    ///
    /// The Loading send finishes before the document send starts. The
    /// returned [`Delivery`] is the outcome of the document send.
    pub async fn dispatch(
        &self,
        channel: Option<&BrowserChannel>,
        doc: Document,
    ) -> Result<Delivery, CodecError> {
        let payload = doc.encode()?;
        let loading = Placeholder::Loading.document().encode()?;

        let _guard = self.dispatch_lock.lock().await;

        self.transition(SessionState::Loading);
        if let Err(e) = push(channel, loading).await {
            debug!("Loading placeholder not delivered: {e}");
        }

        let delivery = push(channel, payload).await;
        if let Err(ref e) = delivery {
            warn!("Document not delivered: {e}");
        }

        self.transition(SessionState::Served(doc));
        Ok(delivery)
    }

    fn transition(&self, next: SessionState) {
        let phase = next.phase();
        if let SessionState::Served(ref doc) = next {
            *self.last_served.lock() = Some(doc.clone());
        }
        *self.state.lock() = next;
        debug!("Session phase -> {phase:?}");
        // No subscribers is fine.
        let _ = self.phases.send(phase);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

async fn push(channel: Option<&BrowserChannel>, payload: String) -> Delivery {
    match channel {
        Some(ch) => ch.send_text(payload).await,
        None => Err(SendError::NoChannel),
    }
}
