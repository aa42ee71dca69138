//! pushviz: push Vega-Lite documents to a browser tab.
//!
//! Usage:
//!   pushviz chart.json                  # Serve on 8080, show chart.json
//!   pushviz --port 9000 a.json b.json   # Show a.json, then b.json
//!   producer | pushviz --stdin          # One JSON document per line
//!   pushviz --no-browser                # Print the URL instead of opening it

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use pushviz_protocol::{DEFAULT_HOSTNAME, DEFAULT_PORT, Document};
use pushviz_server::{NoBrowser, PlotError, Plotter, PlotterConfig, ServerError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pushviz", about = "Show Vega-Lite documents in a browser tab")]
struct Cli {
    /// JSON documents to show, in order
    files: Vec<PathBuf>,

    /// Port to listen on (0 for OS-assigned)
    #[arg(long, env = "PUSHVIZ_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Hostname to bind to
    #[arg(long, env = "PUSHVIZ_HOST", default_value = DEFAULT_HOSTNAME)]
    hostname: String,

    /// Don't open a browser; log the page URL instead
    #[arg(long)]
    no_browser: bool,

    /// Seconds to wait for the browser to connect (0 waits forever)
    #[arg(long, default_value = "30")]
    connect_timeout: u64,

    /// Directory served for paths other than the page itself
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Read one JSON document per line from stdin; exit when it closes
    #[arg(long)]
    stdin: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file (defaults to ~/.pushviz/logs/pushviz.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,
}

impl Cli {
    fn plotter_config(&self) -> PlotterConfig {
        let timeout = match self.connect_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let config = PlotterConfig::default()
            .with_hostname(self.hostname.clone())
            .with_default_port(self.port)
            .with_connect_timeout(timeout);
        match &self.static_dir {
            Some(dir) => config.with_static_dir(dir),
            None => config,
        }
    }
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let Some(ref log_file_arg) = cli.log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return;
    };

    let log_path = if log_file_arg == "DEFAULT" {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".pushviz/logs/pushviz.log")
    } else {
        PathBuf::from(log_file_arg)
    };
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
            eprintln!("Logging to {}", log_path.display());
        }
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            warn!("Failed to open log file {}: {e}; logging to stderr", log_path.display());
        }
    }
}

/// Show one document, logging the outcome. Lost connections are not fatal:
/// the next document retries against whatever browser is connected then.
async fn show(plotter: &Plotter, source: &str, doc: Document) {
    match plotter.plot(doc).await {
        Ok(report) => debug!("{source} shown on port {}", report.port),
        Err(PlotError::LostConnection(report)) => {
            warn!(
                "{source} did not reach the browser; reload {} to reconnect",
                report.server.url
            );
            if let Ok(json) = serde_json::to_string(&report) {
                debug!("Delivery report: {json}");
            }
        }
        Err(e) => error!("{source}: {e}"),
    }
}

async fn show_file(plotter: &Plotter, path: &Path) {
    let source = path.display().to_string();
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to read {source}: {e}");
            return;
        }
    };
    match Document::decode(&text) {
        Ok(doc) => show(plotter, &source, doc).await,
        Err(e) => error!("{source}: {e}"),
    }
}

/// Forward stdin lines on a blocking thread. The channel closes on EOF.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Show each stdin line until EOF or Ctrl+C.
async fn show_stdin(plotter: &Plotter) {
    let mut lines = spawn_stdin_reader();
    let mut line_no = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return,
            line = lines.recv() => {
                let Some(line) = line else {
                    info!("stdin closed; shutting down");
                    return;
                };
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                let source = format!("stdin:{line_no}");
                match Document::decode(&line) {
                    Ok(doc) => show(plotter, &source, doc).await,
                    Err(e) => error!("{source}: {e}"),
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let config = cli.plotter_config();
    let plotter = if cli.no_browser {
        Plotter::with_launcher(config, NoBrowser)
    } else {
        Plotter::new(config)
    };

    match plotter.start_server(cli.port).await {
        Ok(started) => info!("Browser {} connected to {}", started.channel.id, started.server.url),
        Err(e @ ServerError::HandshakeTimeout { .. }) => {
            let url = plotter.server_info().map(|info| info.url).unwrap_or_default();
            warn!("{e}; still listening, open {url} to view plots");
        }
        Err(e) => {
            error!("Failed to start server: {e}");
            std::process::exit(1);
        }
    }

    for path in &cli.files {
        show_file(&plotter, path).await;
    }

    if cli.stdin {
        show_stdin(&plotter).await;
    } else {
        info!("Press Ctrl+C to stop");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
        }
    }

    plotter.stop_server().await;
    info!("Server stopped");
}
