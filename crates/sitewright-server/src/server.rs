//! Development HTTP server.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use sitewright_static::SiteConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::websocket::{
    livereload_client_script, LiveReload, LiveReloadMessage, LIVERELOAD_PATH,
    LIVERELOAD_SCRIPT_PATH,
};

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,

    /// Directories searched for each request, first hit wins
    pub roots: [PathBuf; 3],

    /// Served under `/node_modules`
    pub node_modules: PathBuf,
}

impl DevServerConfig {
    /// Serve `temp`, then `src`, then `public`.
    pub fn from_site(config: &SiteConfig) -> Self {
        Self {
            port: config.server.port,
            host: config.server.host.clone(),
            open: config.server.open,
            roots: [
                config.temp.clone(),
                config.src.clone(),
                config.public.clone(),
            ],
            node_modules: config.root.join("node_modules"),
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to bind to {0}: {1}")]
    Bind(SocketAddr, String),

    #[error("Server error: {0}")]
    Serve(String),

    #[error("File watch error: {0}")]
    Watch(String),

    #[error(transparent)]
    Config(#[from] sitewright_static::ConfigError),

    #[error(transparent)]
    Registry(#[from] sitewright_tasks::RegistryError),
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    hub: LiveReload,
}

impl DevServer {
    pub fn new(config: DevServerConfig, hub: LiveReload) -> Self {
        Self { config, hub }
    }

    /// Routes: live-reload endpoints, `/node_modules`, then the root chain.
    pub fn router(&self) -> Router {
        let [temp, src, public] = &self.config.roots;
        let files = ServeDir::new(temp).fallback(ServeDir::new(src).fallback(ServeDir::new(public)));

        Router::new()
            .route(LIVERELOAD_PATH, get(ws_handler))
            .route(LIVERELOAD_SCRIPT_PATH, get(script_handler))
            .nest_service("/node_modules", ServeDir::new(&self.config.node_modules))
            .fallback_service(files)
            .layer(middleware::from_fn(inject_client))
            .layer(CorsLayer::permissive())
            .with_state(self.hub.clone())
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                ServerError::InvalidAddress(format!("{}:{}", self.config.host, self.config.port))
            })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(addr, e.to_string()))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Serve(e.to_string()))?;
        let url = format!("http://{}", addr);

        tracing::info!("Dev server running at {}", url);

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))
    }
}

/// Add the live-reload script to every HTML response.
async fn inject_client(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to buffer HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Insert the client script tag before `</body>`, or append it.
pub fn inject_script(html: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, LIVERELOAD_SCRIPT_PATH);

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(index) => format!("{}{}{}", &html[..index], tag, &html[index..]),
        None => format!("{}{}", html, tag),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<LiveReload>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

/// Forward hub messages to one client until it disconnects.
async fn handle_ws(mut socket: WebSocket, hub: LiveReload) {
    let mut rx = hub.subscribe();

    if send_json(&mut socket, &LiveReloadMessage::Connected).await.is_err() {
        return;
    }

    loop {
        match rx.recv().await {
            Ok(msg) => {
                if send_json(&mut socket, &msg).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Live-reload client lagged by {} message(s)", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn send_json(socket: &mut WebSocket, msg: &LiveReloadMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|e| {
        tracing::warn!("Failed to serialize live-reload message: {}", e);
    })?;
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        livereload_client_script(),
    )
}
