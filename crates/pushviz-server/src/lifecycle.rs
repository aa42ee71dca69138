//! Server lifecycle: at most one listener, started and stopped as a unit.
//!
//! Starting always tears down the previous listener first, so only one
//! port is ever live. After binding, the browser is pointed at the page
//! and the caller waits (bounded) for its handshake before the Ready
//! placeholder goes out.

use std::sync::Arc;

use parking_lot::Mutex;
use pushviz_transport::{ChannelInfo, ChannelRegistry, TransportServer};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::{info, warn};

use crate::browser::BrowserLauncher;
use crate::config::PlotterConfig;
use crate::error::{ServerError, ServerInfo};
use crate::session::Session;

/// Result of a successful start: the listener and the browser that joined it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    pub server: ServerInfo,
    pub channel: ChannelInfo,
}

/// A bound listener plus the outcome of waiting for its browser.
struct Launch {
    server: ServerInfo,
    handshake: Result<ChannelInfo, ServerError>,
}

pub struct Lifecycle {
    config: PlotterConfig,
    registry: Arc<ChannelRegistry>,
    session: Arc<Session>,
    launcher: Arc<dyn BrowserLauncher>,
    /// The listener. Held across start/stop so they never overlap.
    server: AsyncMutex<Option<TransportServer>>,
    /// Copy of the running listener's info for lock-free inspection.
    info: Mutex<Option<ServerInfo>>,
    /// Bumped by `stop` before it queues for the lock; a pending handshake
    /// wait gives up when it changes.
    stop_generation: watch::Sender<u64>,
}

impl Lifecycle {
    pub fn new(
        config: PlotterConfig,
        registry: Arc<ChannelRegistry>,
        session: Arc<Session>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        let (stop_generation, _) = watch::channel(0);
        Self {
            config,
            registry,
            session,
            launcher,
            server: AsyncMutex::new(None),
            info: Mutex::new(None),
            stop_generation,
        }
    }

    pub fn config(&self) -> &PlotterConfig {
        &self.config
    }

    /// Info about the running listener, if any.
    pub fn info(&self) -> Option<ServerInfo> {
        self.info.lock().clone()
    }

    /// Stop any running listener, then start a new one on `port`.
    pub async fn start(&self, port: u16) -> Result<Started, ServerError> {
        let mut stopped = self.stop_generation.subscribe();
        let mut slot = self.server.lock().await;
        let launch = self.start_locked(&mut slot, port, &mut stopped).await?;
        Ok(Started {
            server: launch.server,
            channel: launch.handshake?,
        })
    }

    /// Make sure a listener is running, on `port` if one is given.
    ///
    /// `None` accepts whatever is running and otherwise starts on the
    /// default port. Port 0 matches any running listener. A listener that
    /// binds but never sees a browser is still returned; sends to it
    /// simply find no channel.
    pub async fn ensure_running(&self, port: Option<u16>) -> Result<ServerInfo, ServerError> {
        let mut stopped = self.stop_generation.subscribe();
        let mut slot = self.server.lock().await;

        if let Some(server) = slot.as_ref().filter(|s| s.is_running()) {
            match port {
                None | Some(0) => return Ok(ServerInfo::from(server)),
                Some(p) if p == server.port() => return Ok(ServerInfo::from(server)),
                Some(p) => info!("Port {p} requested; restarting server from port {}", server.port()),
            }
        }

        let port = port.unwrap_or(self.config.default_port);
        let launch = self.start_locked(&mut slot, port, &mut stopped).await?;
        Ok(launch.server)
    }

    /// Stop the listener and forget the browser channel. No-op when stopped.
    ///
    /// A start that is still waiting for its browser is abandoned first.
    pub async fn stop(&self) {
        self.stop_generation.send_modify(|generation| *generation = generation.wrapping_add(1));
        let mut slot = self.server.lock().await;
        self.stop_locked(&mut slot).await;
    }

    async fn stop_locked(&self, slot: &mut Option<TransportServer>) {
        let Some(mut server) = slot.take() else {
            return;
        };
        *self.info.lock() = None;

        info!("Stopping pushviz server on port {}", server.port());
        server.stop().await;

        if let Some(channel) = self.registry.clear() {
            channel.close();
        }
    }

    async fn start_locked(
        &self,
        slot: &mut Option<TransportServer>,
        port: u16,
        stopped: &mut watch::Receiver<u64>,
    ) -> Result<Launch, ServerError> {
        self.stop_locked(slot).await;
        // Channels from a previous listener must not satisfy the wait below.
        self.registry.clear();

        let server = TransportServer::start(self.config.transport(port), self.registry.clone()).await?;
        let server_info = ServerInfo::from(&server);
        *slot = Some(server);
        *self.info.lock() = Some(server_info.clone());
        self.session.reset();

        if let Err(e) = self.launcher.open(&server_info.url) {
            warn!("{e}; open {} manually", server_info.url);
        }

        let url = server_info.url.clone();
        let waited = tokio::select! {
            channel = self.registry.wait_for_channel(self.config.connect_timeout) => channel.ok_or_else(|| {
                let timeout = self.config.connect_timeout.unwrap_or_default();
                warn!("No browser connected to {url} within {timeout:?}");
                ServerError::HandshakeTimeout { url: url.clone(), timeout }
            }),
            _ = stopped.changed() => {
                info!("Stop requested while waiting for a browser on {url}");
                Err(ServerError::Cancelled { url: url.clone() })
            }
        };

        // On failure the listener stays up so a late browser can still connect.
        let handshake = match waited {
            Ok(channel) => {
                match self.session.show_ready(Some(channel.as_ref())).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Ready placeholder not delivered: {e}"),
                    Err(e) => warn!("Ready placeholder could not be encoded: {e}"),
                }
                info!("pushviz server ready on port {} (browser {})", server_info.port, channel.id());
                Ok(channel.info())
            }
            Err(e) => Err(e),
        };

        Ok(Launch {
            server: server_info,
            handshake,
        })
    }
}
