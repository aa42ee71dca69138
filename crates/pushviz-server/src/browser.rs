//! Browser launching.
//!
//! Starting the server points a browser at its page. The launcher is a
//! trait so headless sessions and tests can substitute their own.

use tracing::info;

#[derive(Debug, thiserror::Error)]
#[error("failed to open a browser at {url}: {source}")]
pub struct LaunchError {
    pub url: String,
    #[source]
    pub source: std::io::Error,
}

/// Opens the page at `url` somewhere a human (or a test) can see it.
pub trait BrowserLauncher: Send + Sync + 'static {
    fn open(&self, url: &str) -> Result<(), LaunchError>;
}

/// The platform's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), LaunchError> {
        webbrowser::open(url).map_err(|source| LaunchError {
            url: url.to_string(),
            source,
        })
    }
}

/// Opens nothing; the URL is logged for the user to visit.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn open(&self, url: &str) -> Result<(), LaunchError> {
        info!("Open {url} in a browser to view plots");
        Ok(())
    }
}
