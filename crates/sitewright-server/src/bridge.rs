//! Notification sink between the watch coordinator and connected browsers.

use std::path::PathBuf;

/// How a finished rebuild is presented to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notify {
    /// Full page reload
    Reload,

    /// Hot-swap assets of this type (e.g. "css") without reloading
    Inject(String),
}

/// Something that can tell browsers about fresh output.
///
/// Delivery is best-effort: callers log failures and never retry.
pub trait DevServerBridge: Send + Sync {
    fn reload(&self, paths: &[PathBuf]) -> Result<(), BridgeError>;

    fn inject_stream(&self, file_type: &str, paths: &[PathBuf]) -> Result<(), BridgeError>;

    /// Dispatch on a [`Notify`] kind.
    fn notify(&self, kind: &Notify, paths: &[PathBuf]) -> Result<(), BridgeError> {
        match kind {
            Notify::Reload => self.reload(paths),
            Notify::Inject(file_type) => self.inject_stream(file_type, paths),
        }
    }
}

/// A notification that could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("No live-reload clients connected")]
    NoClients,

    #[error("Notification failed: {0}")]
    Failed(String),
}
