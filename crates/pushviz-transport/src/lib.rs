//! pushviz Transport Layer
//!
//! Serves the browser page and owns the WebSocket side of the push
//! protocol. The transport layer handles:
//! - Listener lifecycle (bind, graceful stop with a bounded drain)
//! - The HTML shell at `/` and static files for every other path
//! - WebSocket handshakes on `/ws`, each of which becomes the single
//!   registered [`BrowserChannel`]
//!
//! What gets pushed, and when, is decided one layer up in `pushviz-server`.

pub mod channel;
pub mod page;
pub mod registry;
pub mod server;

pub use channel::{BrowserChannel, ChannelInfo, ChannelReceiver, Outbound, PendingSend, SendError};
pub use registry::ChannelRegistry;
pub use server::{AppState, TransportConfig, TransportError, TransportServer, build_router};
