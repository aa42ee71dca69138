//! Plotter configuration.

use std::path::PathBuf;
use std::time::Duration;

use pushviz_protocol::{DEFAULT_HOSTNAME, DEFAULT_PORT};
use pushviz_transport::TransportConfig;

#[derive(Debug, Clone)]
pub struct PlotterConfig {
    /// Hostname to bind to
    pub hostname: String,
    /// Port used by `plot` when no server is running (0 for OS-assigned)
    pub default_port: u16,
    /// Upper bound on waiting for the browser's handshake; `None` waits forever
    pub connect_timeout: Option<Duration>,
    /// Drain period granted to open connections on stop
    pub shutdown_grace: Duration,
    /// Directory served for paths other than the page itself
    pub static_dir: Option<PathBuf>,
}

impl Default for PlotterConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.into(),
            default_port: DEFAULT_PORT,
            connect_timeout: Some(Duration::from_secs(30)),
            shutdown_grace: Duration::from_secs(2),
            static_dir: None,
        }
    }
}

impl PlotterConfig {
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }

    /// Transport settings for a listener on `port`.
    pub fn transport(&self, port: u16) -> TransportConfig {
        TransportConfig {
            port,
            hostname: self.hostname.clone(),
            static_dir: self.static_dir.clone(),
            shutdown_grace: self.shutdown_grace,
        }
    }
}
