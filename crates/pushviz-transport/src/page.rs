//! The HTML shell served at `/`.
//!
//! The page loads Vega, Vega-Lite and vega-embed from a CDN, opens a
//! WebSocket back to the server, and renders every text frame that parses
//! as JSON. Frames that do not parse (the connection acknowledgement, for
//! one) are logged to the console and otherwise ignored.

use pushviz_protocol::Messages;

const VEGA_SCRIPTS: [&str; 3] = [
    "https://cdn.jsdelivr.net/npm/vega@5",
    "https://cdn.jsdelivr.net/npm/vega-lite@5",
    "https://cdn.jsdelivr.net/npm/vega-embed@6",
];

/// Render the page for a server bound to `port`.
pub fn render_page(port: u16) -> String {
    let scripts: String = VEGA_SCRIPTS
        .iter()
        .map(|src| format!("    <script src=\"{src}\"></script>\n"))
        .collect();

    format!(
        r##"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>pushviz</title>
{scripts}    <style>
      body {{ font-family: sans-serif; margin: 2em; }}
      #status {{ color: #888; font-size: 12px; }}
    </style>
  </head>
  <body>
    <div id="vis"></div>
    <div id="status">connecting...</div>
    <script>
      (function () {{
        var status = document.getElementById("status");
        var socket = new WebSocket("ws://" + window.location.hostname + ":{port}{ws_path}");
        socket.onopen = function () {{ status.textContent = "connected on port {port}"; }};
        socket.onclose = function () {{ status.textContent = "disconnected: this view may be stale"; }};
        socket.onmessage = function (event) {{
          var spec;
          try {{
            spec = JSON.parse(event.data);
          }} catch (err) {{
            console.log("pushviz: ignoring non-document message:", event.data);
            return;
          }}
          vegaEmbed("#vis", spec).catch(function (err) {{ console.error(err); }});
        }};
      }})();
    </script>
  </body>
</html>
"##,
        ws_path = Messages::WS_PATH,
    )
}
