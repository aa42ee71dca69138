//! HTTP + WebSocket transport server using Axum.
//!
//! Serves the page, hands every completed `/ws` handshake to the
//! [`ChannelRegistry`], and runs one task per connection that writes
//! queued frames to the socket.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::get,
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use pushviz_protocol::{DEFAULT_HOSTNAME, DEFAULT_PORT, Messages};
use serde_json::json;
use tokio::sync::watch;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::channel::{BrowserChannel, Outbound};
use crate::page::render_page;
use crate::registry::ChannelRegistry;

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Directory served for paths other than `/`, `/ws` and `/health`
    pub static_dir: Option<PathBuf>,
    /// How long `stop` waits for connections to drain before aborting
    pub shutdown_grace: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            hostname: DEFAULT_HOSTNAME.into(),
            static_dir: None,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Errors raised while bringing the listener up.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Shared state for the router and connection tasks.
pub struct AppState {
    registry: Arc<ChannelRegistry>,
    /// Port the page should connect back to
    port: u16,
    /// Flips to `true` when the server is stopping
    shutdown: watch::Sender<bool>,
    /// Number of live WebSocket connection tasks
    connections: watch::Sender<usize>,
}

impl AppState {
    pub fn new(registry: Arc<ChannelRegistry>, port: u16) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        let (connections, _) = watch::channel(0);
        Arc::new(Self {
            registry,
            port,
            shutdown,
            connections,
        })
    }
}

/// Build the router: page, WebSocket endpoint, health check, static fallback.
pub fn build_router(state: Arc<AppState>, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/", get(page_handler))
        .route(Messages::WS_PATH, get(ws_upgrade_handler))
        .route(Messages::HEALTH_PATH, get(health_handler));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.fallback(not_found_handler),
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// The transport server: one listener, at most one registered browser.
pub struct TransportServer {
    /// Server task handle; `None` once stopped
    handle: Option<tokio::task::JoinHandle<()>>,
    state: Arc<AppState>,
    /// Actual bound port
    port: u16,
    hostname: String,
    started_at: DateTime<Utc>,
    shutdown_grace: Duration,
}

impl TransportServer {
    /// Bind the listener and start serving. Handshakes register into `registry`.
    pub async fn start(
        config: TransportConfig,
        registry: Arc<ChannelRegistry>,
    ) -> Result<Self, TransportError> {
        let addr_text = format!("{}:{}", config.hostname, config.port);
        let listener = tokio::net::TcpListener::bind(addr_text.as_str())
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr_text.clone(),
                source,
            })?;
        let actual_port = listener
            .local_addr()
            .map_err(|source| TransportError::Bind {
                addr: addr_text,
                source,
            })?
            .port();

        let state = AppState::new(registry, actual_port);
        let app = build_router(state.clone(), config.static_dir.clone());

        info!("pushviz listening on http://{}:{}/", config.hostname, actual_port);

        let mut graceful_rx = state.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_signaled(&mut graceful_rx).await;
                })
                .await;
            if let Err(e) = result {
                warn!("pushviz listener exited with error: {e}");
            }
        });

        Ok(Self {
            handle: Some(handle),
            state,
            port: actual_port,
            hostname: config.hostname,
            started_at: Utc::now(),
            shutdown_grace: config.shutdown_grace,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// URL of the page the browser should open.
    pub fn url(&self) -> String {
        format!("http://{}:{}/", self.hostname, self.port)
    }

    /// Whether the listener task is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop accepting, close open connections, and wait for the drain.
    ///
    /// Waits at most `shutdown_grace`; whatever is still running after
    /// that is aborted. Calling `stop` again is a no-op.
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.state.shutdown.send_replace(true);

        let mut connections = self.state.connections.subscribe();
        let abort = handle.abort_handle();

        let drain = async move {
            let _ = handle.await;
            let _ = connections.wait_for(|n| *n == 0).await;
        };

        if tokio::time::timeout(self.shutdown_grace, drain).await.is_err() {
            warn!(
                "pushviz transport did not drain within {:?}; aborting",
                self.shutdown_grace
            );
            abort.abort();
        }
        info!("pushviz transport on port {} stopped", self.port);
    }
}

impl Drop for TransportServer {
    fn drop(&mut self) {
        // A dropped server must not leave its listener running.
        self.state.shutdown.send_replace(true);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn page_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(render_page(state.port))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "port": state.port,
        "connected": state.registry.channel().is_some(),
    }))
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // The ack goes out before registration so it always precedes documents.
    if let Err(e) = ws_tx
        .send(Message::Text(Messages::CONNECTED_ACK.into()))
        .await
    {
        warn!("Failed to acknowledge browser handshake: {e}");
        return;
    }

    let (channel, mut outbound) = BrowserChannel::new();
    let channel_id = channel.id().to_string();
    state.connections.send_modify(|n| *n += 1);
    state.registry.set_channel(Arc::new(channel));

    let mut shutdown = state.shutdown.subscribe();

    loop {
        tokio::select! {
            command = outbound.recv() => {
                match command {
                    Some(Outbound::Send(pending)) => {
                        let frame = Message::Text(pending.payload().to_owned().into());
                        let result = ws_tx.send(frame).await.map_err(|e| e.to_string());
                        let failed = result.is_err();
                        pending.complete(result);
                        if failed {
                            warn!("Write to browser channel {channel_id} failed");
                            break;
                        }
                    }
                    // Closed explicitly, or every handle was dropped.
                    Some(Outbound::Close) | None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Browser disconnected: {channel_id}");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {channel_id}: {e}");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!("Ignoring {} byte message from browser {channel_id}", text.as_str().len());
                    }
                    _ => {}
                }
            }

            _ = shutdown_signaled(&mut shutdown) => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    state.registry.clear_if(&channel_id);
    state.connections.send_modify(|n| *n = n.saturating_sub(1));
    info!("Browser channel closed: {channel_id}");
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn shutdown_signaled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
