//! Develop mode: compile once, then watch, rebuild and serve.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sitewright_static::{tasks, ConfigError, SiteConfig, SitePipeline};

use crate::bridge::Notify;
use crate::coordinator::{WatchBinding, WatchCoordinator};
use crate::server::{DevServer, DevServerConfig, ServerError};
use crate::watcher::FileWatcher;
use crate::websocket::LiveReload;

/// The bindings develop mode watches.
///
/// Styles are hot-swapped; scripts and pages reload the page; images,
/// fonts and public files reload without running a task.
pub fn site_bindings(config: &SiteConfig) -> Result<Vec<WatchBinding>, ConfigError> {
    let src = &config.src;
    let paths = &config.paths;
    let assets: Vec<String> = paths.images.iter().chain(&paths.fonts).cloned().collect();

    Ok(vec![
        WatchBinding::run(
            "styles",
            config.group(src, &paths.styles)?,
            tasks::STYLE,
            Notify::Inject("css".to_string()),
        ),
        WatchBinding::run(
            "scripts",
            config.group(src, &paths.scripts)?,
            tasks::SCRIPT,
            Notify::Reload,
        ),
        WatchBinding::run(
            "pages",
            config.group(src, &paths.pages)?,
            tasks::PAGE,
            Notify::Reload,
        ),
        WatchBinding::reload_only("assets", config.group(src, &assets)?),
        WatchBinding::reload_only("public", config.group(&config.public, &["**".to_string()])?),
    ])
}

/// Run develop mode until the server stops.
///
/// A failing compile is reported and the server starts anyway; the next
/// successful rebuild brings the browser up to date.
pub async fn develop(pipeline: SitePipeline) -> Result<(), ServerError> {
    let config = pipeline.config().clone();

    let initial = pipeline.compile().await?;
    if !initial.is_success() {
        tracing::warn!("Initial compile failed; serving the last good output");
    }

    let hub = LiveReload::new(served_roots(&config));
    let coordinator = WatchCoordinator::start(
        site_bindings(&config)?,
        pipeline.runner().clone(),
        Arc::new(hub.clone()),
        Duration::from_millis(config.server.debounce_ms),
    )?;

    let watch_roots: Vec<PathBuf> = [&config.src, &config.public]
        .into_iter()
        .map(|dir| canonical(dir))
        .collect();
    let (watcher, mut changes) =
        FileWatcher::new(&watch_roots).map_err(|e| ServerError::Watch(e.to_string()))?;

    tokio::spawn(async move {
        let _watcher = watcher;
        while let Some(path) = changes.recv().await {
            coordinator.dispatch(&path);
        }
        coordinator.shutdown().await;
    });

    DevServer::new(DevServerConfig::from_site(&config), hub)
        .start()
        .await
}

/// Served roots as configured and canonicalized, in priority order.
fn served_roots(config: &SiteConfig) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    for dir in [&config.temp, &config.src, &config.public] {
        roots.push(dir.clone());
        let resolved = canonical(dir);
        if resolved != *dir {
            roots.push(resolved);
        }
    }
    roots
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
