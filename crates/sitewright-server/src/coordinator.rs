//! Maps file changes to rebuilds, one serialized worker per binding.
//!
//! Each binding owns a worker with a small state machine:
//!
//! ```text
//! Idle --change--> Pending --debounce elapsed--> Running --done--> Idle
//!                     ^                              |
//!                     +---- changes during the run --+
//! ```
//!
//! Changes that arrive while a rebuild is running are queued and coalesced
//! into a single follow-up run, so a binding never has two rebuilds in flight
//! and never loses a trigger. Workers for different bindings are independent.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sitewright_tasks::{GlobGroup, RegistryError, Runner};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::bridge::{BridgeError, DevServerBridge, Notify};

/// What a binding does once its debounce window closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Run a registered task, then notify on success
    Run { task: String, notify: Notify },

    /// Skip the task runner and reload straight away
    ReloadOnly,
}

/// A glob group paired with its reaction to changes.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    pub name: String,
    pub group: GlobGroup,
    pub action: WatchAction,
}

impl WatchBinding {
    pub fn run(
        name: impl Into<String>,
        group: GlobGroup,
        task: impl Into<String>,
        notify: Notify,
    ) -> Self {
        Self {
            name: name.into(),
            group,
            action: WatchAction::Run {
                task: task.into(),
                notify,
            },
        }
    }

    pub fn reload_only(name: impl Into<String>, group: GlobGroup) -> Self {
        Self {
            name: name.into(),
            group,
            action: WatchAction::ReloadOnly,
        }
    }
}

/// Where a binding's worker currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Idle,
    Pending,
    Running,
}

struct BindingHandle {
    name: String,
    group: GlobGroup,
    events: mpsc::UnboundedSender<PathBuf>,
    state: watch::Receiver<BindingState>,
    worker: JoinHandle<()>,
}

/// Owns one worker per [`WatchBinding`].
pub struct WatchCoordinator {
    bindings: Vec<BindingHandle>,
}

impl fmt::Debug for WatchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchCoordinator")
            .field("bindings", &self.names())
            .finish_non_exhaustive()
    }
}

impl WatchCoordinator {
    /// Spawn a worker for every binding.
    ///
    /// Fails if a binding names a task the runner does not know. Must be
    /// called from within a tokio runtime.
    pub fn start(
        bindings: Vec<WatchBinding>,
        runner: Runner,
        bridge: Arc<dyn DevServerBridge>,
        debounce: Duration,
    ) -> Result<Self, RegistryError> {
        for binding in &bindings {
            if let WatchAction::Run { task, .. } = &binding.action {
                if !runner.registry().contains(task) {
                    return Err(RegistryError::NotRegistered(task.clone()));
                }
            }
        }

        let bindings = bindings
            .into_iter()
            .map(|binding| {
                let (events_tx, events_rx) = mpsc::unbounded_channel();
                let (state_tx, state_rx) = watch::channel(BindingState::Idle);

                let worker = Worker {
                    name: binding.name.clone(),
                    action: binding.action,
                    runner: runner.clone(),
                    bridge: Arc::clone(&bridge),
                    debounce,
                    state: state_tx,
                    events: events_rx,
                };

                BindingHandle {
                    name: binding.name,
                    group: binding.group,
                    events: events_tx,
                    state: state_rx,
                    worker: tokio::spawn(worker.run()),
                }
            })
            .collect();

        Ok(Self { bindings })
    }

    /// Route a changed path to every binding whose group matches it.
    ///
    /// Returns how many bindings received the change.
    pub fn dispatch(&self, path: &Path) -> usize {
        let mut matched = 0;
        for binding in &self.bindings {
            if binding.group.matches_path(path) && binding.events.send(path.to_path_buf()).is_ok() {
                tracing::debug!("{}: change {}", binding.name, path.display());
                matched += 1;
            }
        }
        matched
    }

    pub fn names(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.name.as_str()).collect()
    }

    /// Current state of the binding called `name`.
    pub fn state(&self, name: &str) -> Option<BindingState> {
        self.find(name).map(|b| *b.state.borrow())
    }

    /// Follow state changes of the binding called `name`.
    pub fn subscribe(&self, name: &str) -> Option<watch::Receiver<BindingState>> {
        self.find(name).map(|b| b.state.clone())
    }

    /// Stop accepting changes and wait for in-flight work to finish.
    pub async fn shutdown(self) {
        let workers: Vec<_> = self
            .bindings
            .into_iter()
            .map(|binding| {
                drop(binding.events);
                binding.worker
            })
            .collect();

        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!("Watch worker ended abnormally: {}", e);
            }
        }
    }

    fn find(&self, name: &str) -> Option<&BindingHandle> {
        self.bindings.iter().find(|b| b.name == name)
    }
}

struct Worker {
    name: String,
    action: WatchAction,
    runner: Runner,
    bridge: Arc<dyn DevServerBridge>,
    debounce: Duration,
    state: watch::Sender<BindingState>,
    events: mpsc::UnboundedReceiver<PathBuf>,
}

impl Worker {
    async fn run(mut self) {
        let mut changed = BTreeSet::new();

        loop {
            if changed.is_empty() {
                match self.events.recv().await {
                    Some(path) => {
                        changed.insert(path);
                    }
                    None => break,
                }
            }

            self.state.send_replace(BindingState::Pending);
            self.collect_burst(&mut changed).await;

            self.state.send_replace(BindingState::Running);
            let paths: Vec<PathBuf> = std::mem::take(&mut changed).into_iter().collect();
            self.execute(paths).await;

            while let Ok(path) = self.events.try_recv() {
                changed.insert(path);
            }
            if changed.is_empty() {
                self.state.send_replace(BindingState::Idle);
            } else {
                tracing::debug!(
                    "{}: {} change(s) arrived during the run, rebuilding",
                    self.name,
                    changed.len()
                );
            }
        }

        self.state.send_replace(BindingState::Idle);
    }

    /// Absorb further changes until the debounce window closes.
    async fn collect_burst(&mut self, changed: &mut BTreeSet<PathBuf>) {
        let deadline = Instant::now() + self.debounce;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                event = self.events.recv() => match event {
                    Some(path) => {
                        changed.insert(path);
                    }
                    None => break,
                },
            }
        }
    }

    async fn execute(&self, changed: Vec<PathBuf>) {
        match &self.action {
            WatchAction::ReloadOnly => {
                tracing::info!("{}: {} file(s) changed, reloading", self.name, changed.len());
                self.deliver(&Notify::Reload, &changed);
            }
            WatchAction::Run { task, notify } => {
                tracing::info!(
                    "{}: {} file(s) changed, running '{}'",
                    self.name,
                    changed.len(),
                    task
                );

                match self.runner.run(task).await {
                    Ok(run) if run.is_success() => {
                        let written = run.written();
                        let paths = if written.is_empty() { changed } else { written };
                        self.deliver(notify, &paths);
                    }
                    Ok(run) => {
                        // Stale output stays on screen until the next good build.
                        for failure in &run.failures {
                            tracing::error!("{}: '{}' failed: {}", self.name, failure.task, failure.error);
                        }
                    }
                    Err(e) => tracing::error!("{}: {}", self.name, e),
                }
            }
        }
    }

    fn deliver(&self, kind: &Notify, paths: &[PathBuf]) {
        match self.bridge.notify(kind, paths) {
            Ok(()) => tracing::debug!("{}: notified {:?}", self.name, kind),
            Err(BridgeError::NoClients) => {
                tracing::debug!("{}: no browsers connected", self.name)
            }
            Err(e) => tracing::warn!("{}: {}", self.name, e),
        }
    }
}
