//! Live-reload hub broadcasting to browser clients over WebSocket.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::bridge::{BridgeError, DevServerBridge};

/// Path of the WebSocket endpoint.
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// Path of the client script.
pub const LIVERELOAD_SCRIPT_PATH: &str = "/__livereload.js";

/// Messages sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveReloadMessage {
    /// Full page reload
    Reload { paths: Vec<String> },

    /// Swap assets of one type in place
    Inject { file_type: String, paths: Vec<String> },

    /// Connection established
    Connected,
}

/// Hub for broadcasting live-reload messages to all connected clients.
///
/// Paths are sent as URL paths: each is made relative to the first served
/// root that contains it.
#[derive(Debug, Clone)]
pub struct LiveReload {
    sender: broadcast::Sender<LiveReloadMessage>,
    roots: Vec<PathBuf>,
}

impl LiveReload {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        let (sender, _) = broadcast::channel(100);
        Self {
            sender,
            roots: roots.into_iter().collect(),
        }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: LiveReloadMessage) -> Result<(), BridgeError> {
        self.sender
            .send(msg)
            .map(|_| ())
            .map_err(|_| BridgeError::NoClients)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveReloadMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn url_paths(&self, paths: &[PathBuf]) -> Vec<String> {
        paths.iter().map(|p| self.url_path(p)).collect()
    }

    fn url_path(&self, path: &Path) -> String {
        let relative = self
            .roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);
        format!("/{}", relative.to_string_lossy().replace('\\', "/").trim_start_matches('/'))
    }
}

impl DevServerBridge for LiveReload {
    fn reload(&self, paths: &[PathBuf]) -> Result<(), BridgeError> {
        self.send(LiveReloadMessage::Reload {
            paths: self.url_paths(paths),
        })
    }

    fn inject_stream(&self, file_type: &str, paths: &[PathBuf]) -> Result<(), BridgeError> {
        self.send(LiveReloadMessage::Inject {
            file_type: file_type.to_string(),
            paths: self.url_paths(paths),
        })
    }
}

/// Client-side live-reload script.
///
/// `inject` messages for CSS re-request matching stylesheets with a
/// cache-busting query instead of reloading the page.
pub fn livereload_client_script() -> String {
    format!(
        r#"
(function() {{
  'use strict';

  var protocol = location.protocol === 'https:' ? 'wss://' : 'ws://';
  var reconnectAttempts = 0;

  function matches(href, paths) {{
    if (!paths.length) return true;
    var path = new URL(href, location.href).pathname;
    return paths.some(function(p) {{ return path === p || path.endsWith(p); }});
  }}

  function injectCss(paths) {{
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    var swapped = 0;
    links.forEach(function(link) {{
      if (!matches(link.href, paths)) return;
      var url = new URL(link.href, location.href);
      url.searchParams.set('livereload', Date.now());
      link.href = url.toString();
      swapped++;
    }});
    if (!swapped) location.reload();
  }}

  function connect() {{
    var ws = new WebSocket(protocol + location.host + '{path}');

    ws.onopen = function() {{
      reconnectAttempts = 0;
    }};

    ws.onmessage = function(event) {{
      var msg = JSON.parse(event.data);
      switch (msg.type) {{
        case 'reload':
          location.reload();
          break;
        case 'inject':
          if (msg.file_type === 'css') injectCss(msg.paths);
          else location.reload();
          break;
        case 'connected':
          console.log('[livereload] connected');
          break;
      }}
    }};

    ws.onclose = function() {{
      if (reconnectAttempts < 10) {{
        reconnectAttempts++;
        setTimeout(connect, 1000 * reconnectAttempts);
      }}
    }};
  }}

  connect();
}})();
"#,
        path = LIVERELOAD_PATH
    )
}
