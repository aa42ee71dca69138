//! End-to-end integration tests: server lifecycle, browser handshake, and
//! the Ready → Loading → document sequence as seen by a real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use pushviz_protocol::{Document, Messages, Placeholder};
use pushviz_server::{
    BrowserLauncher, LaunchError, Phase, PlotError, Plotter, PlotterConfig, SessionState,
};
use pushviz_transport::SendError;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const WAIT: Duration = Duration::from_secs(5);

/// One text frame received by a fake tab, tagged with the tab's index.
#[derive(Debug)]
struct Frame {
    tab: usize,
    text: String,
}

/// A launcher that "opens" the page by connecting a WebSocket client to it.
#[derive(Clone)]
struct FakeBrowser {
    opened: Arc<Mutex<Vec<String>>>,
    tabs: Arc<Mutex<Vec<JoinHandle<()>>>>,
    frames: mpsc::UnboundedSender<Frame>,
}

impl FakeBrowser {
    fn new() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (frames, rx) = mpsc::unbounded_channel();
        let browser = Self {
            opened: Arc::new(Mutex::new(Vec::new())),
            tabs: Arc::new(Mutex::new(Vec::new())),
            frames,
        };
        (browser, rx)
    }

    fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// Kill a tab without a close handshake, like a crashed browser.
    fn crash_tab(&self, tab: usize) {
        self.tabs.lock()[tab].abort();
    }
}

impl BrowserLauncher for FakeBrowser {
    fn open(&self, url: &str) -> Result<(), LaunchError> {
        let tab = {
            let mut opened = self.opened.lock();
            opened.push(url.to_string());
            opened.len() - 1
        };
        let ws_url = format!("{}ws", url.replacen("http://", "ws://", 1));
        let frames = self.frames.clone();

        let handle = tokio::spawn(async move {
            let (mut ws, _) = connect_async(&ws_url).await.expect("Failed to connect");
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
                if msg.is_text() {
                    let text = msg.into_text().unwrap().as_str().to_owned();
                    let _ = frames.send(Frame { tab, text });
                }
            }
        });
        self.tabs.lock().push(handle);
        Ok(())
    }
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn test_plotter(default_port: u16) -> (Plotter, FakeBrowser, mpsc::UnboundedReceiver<Frame>) {
    let (browser, frames) = FakeBrowser::new();
    let config = PlotterConfig::default()
        .with_default_port(default_port)
        .with_connect_timeout(Some(WAIT))
        .with_shutdown_grace(Duration::from_millis(500));
    (Plotter::with_launcher(config, browser.clone()), browser, frames)
}

async fn next_frame(frames: &mut mpsc::UnboundedReceiver<Frame>) -> Frame {
    timeout(WAIT, frames.recv())
        .await
        .expect("Timeout waiting for frame")
        .expect("Frame stream ended")
}

/// Read the ack, then expect `expected` documents in order, all on `tab`.
async fn expect_sequence(
    frames: &mut mpsc::UnboundedReceiver<Frame>,
    tab: usize,
    expected: &[Document],
) {
    let ack = next_frame(frames).await;
    assert_eq!(ack.tab, tab);
    assert_eq!(ack.text, Messages::CONNECTED_ACK);
    expect_documents(frames, tab, expected).await;
}

async fn expect_documents(
    frames: &mut mpsc::UnboundedReceiver<Frame>,
    tab: usize,
    expected: &[Document],
) {
    for doc in expected {
        let frame = next_frame(frames).await;
        assert_eq!(frame.tab, tab, "frame arrived on the wrong tab: {frame:?}");
        assert_eq!(&Document::decode(&frame.text).unwrap(), doc);
    }
}

async fn wait_until_disconnected(plotter: &Plotter) {
    timeout(WAIT, async {
        while plotter.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Browser channel was never cleared");
}

fn bar_chart() -> Value {
    json!({
        "mark": "bar",
        "data": { "values": [ {"a": "A", "b": 28}, {"a": "B", "b": 55} ] },
        "encoding": {
            "x": { "field": "a", "type": "nominal" },
            "y": { "field": "b", "type": "quantitative" }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_plot_starts_server_and_shows_ready_loading_document() {
    let port = free_port();
    let (plotter, browser, mut frames) = test_plotter(port);
    let mut phases = plotter.subscribe();

    let report = plotter.plot(bar_chart()).await.unwrap();

    assert!(report.send_succeeded);
    assert_eq!(report.port, port);
    assert!(report.channel.is_some());
    assert_eq!(browser.opened(), vec![format!("http://127.0.0.1:{port}/")]);

    expect_sequence(
        &mut frames,
        0,
        &[
            Placeholder::Ready.document(),
            Placeholder::Loading.document(),
            Document::new(bar_chart()),
        ],
    )
    .await;

    assert_eq!(phases.recv().await.unwrap(), Phase::Ready);
    assert_eq!(phases.recv().await.unwrap(), Phase::Loading);
    assert_eq!(phases.recv().await.unwrap(), Phase::Served);
    assert_eq!(plotter.state(), SessionState::Served(Document::new(bar_chart())));

    plotter.stop_server().await;
}

#[tokio::test]
async fn plot_on_same_port_does_not_restart() {
    let port = free_port();
    let (plotter, browser, mut frames) = test_plotter(0);

    let started = plotter.start_server(port).await.unwrap();
    assert_eq!(started.server.port, port);

    let doc = json!({"mark": "line", "data": {"values": []}});
    let report = plotter.plot_on(port, doc.clone()).await.unwrap();

    assert!(report.send_succeeded);
    assert_eq!(report.channel.as_ref(), Some(&started.channel));
    assert_eq!(browser.opened().len(), 1);
    expect_sequence(
        &mut frames,
        0,
        &[
            Placeholder::Ready.document(),
            Placeholder::Loading.document(),
            Document::new(doc),
        ],
    )
    .await;

    plotter.stop_server().await;
}

#[tokio::test]
async fn repeated_plots_each_pass_through_loading() {
    let (plotter, _browser, mut frames) = test_plotter(0);
    plotter.start_server(0).await.unwrap();
    expect_sequence(&mut frames, 0, &[Placeholder::Ready.document()]).await;

    let mut phases = plotter.subscribe();
    for i in 0..3 {
        let doc = json!({"mark": "point", "data": {"values": [{"x": i}]}});
        plotter.plot(doc.clone()).await.unwrap();
        expect_documents(
            &mut frames,
            0,
            &[Placeholder::Loading.document(), Document::new(doc)],
        )
        .await;
        assert_eq!(phases.recv().await.unwrap(), Phase::Loading);
        assert_eq!(phases.recv().await.unwrap(), Phase::Served);
    }

    plotter.stop_server().await;
}

#[tokio::test]
async fn plot_on_new_port_restarts_before_sending() {
    let first_port = free_port();
    let second_port = free_port();
    let (plotter, browser, mut frames) = test_plotter(0);

    plotter.start_server(first_port).await.unwrap();
    expect_sequence(&mut frames, 0, &[Placeholder::Ready.document()]).await;

    let doc = bar_chart();
    let report = plotter.plot_on(second_port, doc.clone()).await.unwrap();

    assert_eq!(report.port, second_port);
    assert_eq!(plotter.port(), Some(second_port));
    assert_eq!(
        browser.opened(),
        vec![
            format!("http://127.0.0.1:{first_port}/"),
            format!("http://127.0.0.1:{second_port}/"),
        ]
    );
    // The new tab connects and sees Ready before the document arrives.
    expect_sequence(
        &mut frames,
        1,
        &[
            Placeholder::Ready.document(),
            Placeholder::Loading.document(),
            Document::new(doc),
        ],
    )
    .await;

    let old = tokio::net::TcpStream::connect(("127.0.0.1", first_port)).await;
    assert!(old.is_err(), "old listener on {first_port} should be gone");

    plotter.stop_server().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn starting_on_a_second_port_leaves_one_listener() {
    let first_port = free_port();
    let second_port = free_port();
    let (plotter, _browser, _frames) = test_plotter(0);

    plotter.start_server(first_port).await.unwrap();
    let started = plotter.start_server(second_port).await.unwrap();

    assert_eq!(started.server.port, second_port);
    assert_eq!(plotter.port(), Some(second_port));
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", first_port)).await.is_err());
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", second_port)).await.is_ok());

    plotter.stop_server().await;
}

#[tokio::test]
async fn stop_server_twice_is_harmless() {
    let port = free_port();
    let (plotter, _browser, _frames) = test_plotter(0);
    plotter.start_server(port).await.unwrap();
    assert!(plotter.is_connected());

    plotter.stop_server().await;
    plotter.stop_server().await;

    assert!(!plotter.is_running());
    assert!(!plotter.is_connected());
    assert!(plotter.port().is_none());
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_err());
}

#[tokio::test]
async fn restart_on_same_port_after_stop() {
    let port = free_port();
    let (plotter, browser, _frames) = test_plotter(port);

    plotter.plot(bar_chart()).await.unwrap();
    plotter.stop_server().await;
    let report = plotter.plot(bar_chart()).await.unwrap();

    assert_eq!(report.port, port);
    assert_eq!(browser.opened().len(), 2);
    plotter.stop_server().await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel ownership and failures
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn closed_tab_surfaces_lost_connection() {
    let (plotter, browser, _frames) = test_plotter(0);
    plotter.start_server(0).await.unwrap();

    browser.crash_tab(0);
    wait_until_disconnected(&plotter).await;

    let doc = json!({"mark": "area"});
    let err = plotter.plot(doc.clone()).await.unwrap_err();

    let PlotError::LostConnection(report) = err else {
        panic!("expected LostConnection, got {err:?}");
    };
    assert!(!report.send_succeeded);
    assert_eq!(report.failure, Some(SendError::NoChannel));
    assert_eq!(Some(report.port), plotter.port());
    assert_eq!(plotter.last_served(), Some(Document::new(doc.clone())));
    assert_eq!(plotter.state(), SessionState::Served(Document::new(doc)));

    plotter.stop_server().await;
}

#[tokio::test]
async fn newest_handshake_owns_the_channel() {
    let port = free_port();
    let (plotter, browser, mut frames) = test_plotter(0);
    plotter.start_server(port).await.unwrap();
    expect_sequence(&mut frames, 0, &[Placeholder::Ready.document()]).await;

    // A second tab opened by hand.
    let url = format!("ws://127.0.0.1:{port}/ws");
    let (mut second, _) = connect_async(&url).await.expect("Failed to connect");
    let ack = timeout(WAIT, second.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(ack.into_text().unwrap().as_str(), Messages::CONNECTED_ACK);

    // The first tab is closed by the server once superseded.
    timeout(WAIT, async {
        while !browser_tab_finished(&browser, 0) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first tab was never closed");

    let doc = bar_chart();
    plotter.plot(doc.clone()).await.unwrap();

    for expected in [Placeholder::Loading.document(), Document::new(doc)] {
        let msg = timeout(WAIT, second.next()).await.unwrap().unwrap().unwrap();
        let text = msg.into_text().unwrap();
        assert_eq!(Document::decode(text.as_str()).unwrap(), expected);
    }
    assert!(frames.try_recv().is_err(), "superseded tab must receive nothing");

    plotter.stop_server().await;
}

fn browser_tab_finished(browser: &FakeBrowser, tab: usize) -> bool {
    browser.tabs.lock()[tab].is_finished()
}

#[tokio::test]
async fn stop_racing_plot_does_not_panic() {
    let (plotter, _browser, _frames) = test_plotter(0);
    plotter.start_server(0).await.unwrap();
    let plotter = Arc::new(plotter);

    let plotting = {
        let plotter = plotter.clone();
        tokio::spawn(async move { plotter.plot(bar_chart()).await })
    };
    let stopping = {
        let plotter = plotter.clone();
        tokio::spawn(async move { plotter.stop_server().await })
    };

    stopping.await.unwrap();
    // Either outcome is acceptable; neither side may panic.
    let _ = plotting.await.unwrap();
    plotter.stop_server().await;
    assert!(!plotter.is_connected());
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP surface
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn page_and_health_are_served() {
    let port = free_port();
    let (plotter, _browser, _frames) = test_plotter(0);
    plotter.start_server(port).await.unwrap();

    let page = reqwest::get(format!("http://127.0.0.1:{port}/"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains(&format!(":{port}/ws")));

    let health: Value = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connected"], true);

    let missing = reqwest::get(format!("http://127.0.0.1:{port}/nope.js")).await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    plotter.stop_server().await;
}

#[tokio::test]
async fn static_dir_is_served_as_fallback() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("style.css"), "body { color: red; }").unwrap();

    let (browser, _frames) = FakeBrowser::new();
    let config = PlotterConfig::default()
        .with_default_port(0)
        .with_connect_timeout(Some(WAIT))
        .with_static_dir(dir.path());
    let plotter = Plotter::with_launcher(config, browser);
    let started = plotter.start_server(0).await.unwrap();

    let css = reqwest::get(format!("http://127.0.0.1:{}/style.css", started.server.port))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(css, "body { color: red; }");

    plotter.stop_server().await;
}
