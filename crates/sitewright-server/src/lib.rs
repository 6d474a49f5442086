//! Develop-mode services for sitewright.
//!
//! A watch coordinator maps filesystem changes to serialized rebuilds and
//! notifies browsers through a live-reload bridge; the dev server serves the
//! compiled tree with the live-reload client injected.

pub mod bridge;
pub mod coordinator;
pub mod develop;
pub mod server;
pub mod watcher;
pub mod websocket;

pub use bridge::{BridgeError, DevServerBridge, Notify};
pub use coordinator::{BindingState, WatchAction, WatchBinding, WatchCoordinator};
pub use develop::{develop, site_bindings};
pub use server::{inject_script, DevServer, DevServerConfig, ServerError};
pub use watcher::FileWatcher;
pub use websocket::{livereload_client_script, LiveReload, LiveReloadMessage};
