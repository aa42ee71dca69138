//! Plotter: the public entry points.
//!
//! A `Plotter` owns the three pieces of process-wide state (the channel
//! registry, the session, and the listener lifecycle). Independent
//! instances do not share anything, which is what the tests rely on.

use std::sync::Arc;

use pushviz_protocol::Document;
use pushviz_transport::ChannelRegistry;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::config::PlotterConfig;
use crate::error::{PlotError, PlotReport, ServerError, ServerInfo};
use crate::lifecycle::{Lifecycle, Started};
use crate::session::{Phase, Session, SessionState};

pub struct Plotter {
    registry: Arc<ChannelRegistry>,
    session: Arc<Session>,
    lifecycle: Lifecycle,
}

impl Plotter {
    /// A plotter that opens pages in the system browser.
    pub fn new(config: PlotterConfig) -> Self {
        Self::with_launcher(config, SystemBrowser)
    }

    pub fn with_launcher(config: PlotterConfig, launcher: impl BrowserLauncher) -> Self {
        let registry = Arc::new(ChannelRegistry::new());
        let session = Arc::new(Session::new());
        let lifecycle = Lifecycle::new(config, registry.clone(), session.clone(), Arc::new(launcher));
        Self {
            registry,
            session,
            lifecycle,
        }
    }

    /// Start (or restart) the server on `port` and wait for a browser.
    pub async fn start_server(&self, port: u16) -> Result<Started, ServerError> {
        self.lifecycle.start(port).await
    }

    /// Stop the server. Calling it with nothing running is fine.
    pub async fn stop_server(&self) {
        self.lifecycle.stop().await;
    }

    /// Show `doc` on whatever server is running, starting one on the
    /// default port if needed.
    ///
    /// A browser that never connects, or a concurrent `stop_server`, ends
    /// in [`PlotError::LostConnection`] with `doc` recorded as last served.
    pub async fn plot(&self, doc: impl Into<Document>) -> Result<PlotReport, PlotError> {
        self.plot_with(None, doc.into()).await
    }

    /// Show `doc` on the server at `port`, restarting on that port if the
    /// running server is elsewhere.
    pub async fn plot_on(&self, port: u16, doc: impl Into<Document>) -> Result<PlotReport, PlotError> {
        self.plot_with(Some(port), doc.into()).await
    }

    async fn plot_with(&self, port: Option<u16>, doc: Document) -> Result<PlotReport, PlotError> {
        let server = self.lifecycle.ensure_running(port).await?;
        let mark = doc.mark().unwrap_or("?").to_string();

        let channel = self.registry.channel();
        let delivery = self.session.dispatch(channel.as_deref(), doc).await?;

        let report = PlotReport {
            port: server.port,
            server,
            channel: channel.map(|ch| ch.info()),
            send_succeeded: delivery.is_ok(),
            failure: delivery.err(),
        };

        if report.send_succeeded {
            info!("Plotted {mark} document on port {}", report.port);
            Ok(report)
        } else {
            warn!("Plot on port {} did not reach the browser", report.port);
            Err(PlotError::LostConnection(report))
        }
    }

    /// The last document handed to a channel, delivered or not.
    pub fn last_served(&self) -> Option<Document> {
        self.session.last_served()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Receive every session phase transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Phase> {
        self.session.subscribe()
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.lifecycle.info()
    }

    pub fn port(&self) -> Option<u16> {
        self.lifecycle.info().map(|info| info.port)
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.info().is_some()
    }

    /// Whether a browser channel is currently registered.
    pub fn is_connected(&self) -> bool {
        self.registry.channel().is_some()
    }

    pub fn config(&self) -> &PlotterConfig {
        self.lifecycle.config()
    }
}
