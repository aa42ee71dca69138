//! ChannelRegistry: the single browser-channel slot.
//!
//! Last handshake wins. Replacement and reads go through a
//! `tokio::sync::watch` slot, so a reader always sees either the old
//! channel or the new one, and waiters are woken on every change.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::channel::BrowserChannel;

pub struct ChannelRegistry {
    slot: watch::Sender<Option<Arc<BrowserChannel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Register `channel`, replacing any previous one.
    ///
    /// The superseded channel is closed so its tab stops listening and its
    /// connection task exits.
    pub fn set_channel(&self, channel: Arc<BrowserChannel>) {
        let id = channel.id().to_string();
        let previous = self.slot.send_replace(Some(channel));
        info!("Browser channel registered: {id}");

        if let Some(previous) = previous {
            if previous.id() != id {
                info!("Browser channel superseded: {}", previous.id());
                previous.close();
            }
        }
    }

    /// The current channel, if any browser is connected.
    pub fn channel(&self) -> Option<Arc<BrowserChannel>> {
        self.slot.borrow().clone()
    }

    /// Drop the registered channel. Returns it so callers may close it.
    pub fn clear(&self) -> Option<Arc<BrowserChannel>> {
        let previous = self.slot.send_replace(None);
        if let Some(ref ch) = previous {
            debug!("Browser channel cleared: {}", ch.id());
        }
        previous
    }

    /// Clear the slot only if it still holds the channel with `id`.
    ///
    /// Connection tasks call this on disconnect; a newer channel that has
    /// already replaced theirs is left alone.
    pub fn clear_if(&self, id: &str) -> bool {
        self.slot.send_if_modified(|slot| match slot {
            Some(ch) if ch.id() == id => {
                *slot = None;
                true
            }
            _ => false,
        })
    }

    /// Wait until a channel is registered.
    ///
    /// Returns immediately if one already is. `None` for `timeout` waits
    /// without bound; otherwise `None` is returned when the deadline passes.
    pub async fn wait_for_channel(&self, timeout: Option<Duration>) -> Option<Arc<BrowserChannel>> {
        let mut rx = self.slot.subscribe();
        let wait = async move {
            match rx.wait_for(Option::is_some).await {
                Ok(slot) => (*slot).clone(),
                Err(_) => None,
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.ok().flatten(),
            None => wait.await,
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
