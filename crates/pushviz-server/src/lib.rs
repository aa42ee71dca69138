//! pushviz Server
//!
//! Everything above the socket: the display state machine, the one
//! listener's lifecycle, and the `plot` entry points that sequence them.
//!
//! ```ignore
//! let plotter = Plotter::new(PlotterConfig::default());
//! let report = plotter.plot(json!({"mark": "bar", "data": {"values": []}})).await?;
//! assert!(report.send_succeeded);
//! ```

pub mod browser;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod session;

pub use browser::{BrowserLauncher, LaunchError, NoBrowser, SystemBrowser};
pub use config::PlotterConfig;
pub use dispatch::Plotter;
pub use error::{PlotError, PlotReport, ServerError, ServerInfo};
pub use lifecycle::{Lifecycle, Started};
pub use session::{Delivery, Phase, Session, SessionState};
