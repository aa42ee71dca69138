//! Fixed strings shared between the server and the browser page.

/// Routes and plaintext frames used by the push protocol.
pub struct Messages;

impl Messages {
    // ── Routes ──────────────────────────────────────────────────────────
    pub const WS_PATH: &str = "/ws";
    pub const HEALTH_PATH: &str = "/health";

    // ── Frames ──────────────────────────────────────────────────────────
    /// Sent once, as plain text, right after the WebSocket handshake.
    /// The page logs it and ignores it since it is not a document.
    pub const CONNECTED_ACK: &str = "pushviz: connected";
}

/// Default port for the push server.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind address.
pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";
