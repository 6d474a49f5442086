//! Executes registered task graphs and records a [`BuildRun`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;

use crate::error::{RegistryError, TaskError};
use crate::registry::TaskRegistry;
use crate::task::Task;

/// Outcome of one leaf task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafStatus {
    Success,
    Failed(String),
    /// Not run because an earlier member of a sequence failed
    Skipped,
}

/// Per-leaf record in a [`BuildRun`].
#[derive(Debug, Clone)]
pub struct LeafOutcome {
    pub name: String,
    pub status: LeafStatus,
    pub duration: Duration,
    pub written: Vec<PathBuf>,
}

/// A leaf failure with its error.
#[derive(Debug)]
pub struct TaskFailure {
    pub task: String,
    pub error: TaskError,
}

/// Record of one execution of a task graph.
#[derive(Debug)]
pub struct BuildRun {
    /// Name of the task that was run
    pub task: String,

    /// Wall-clock start
    pub started_at: SystemTime,

    /// Total time
    pub duration: Duration,

    /// Leaf outcomes, in completion order
    pub outcomes: Vec<LeafOutcome>,

    /// Every leaf failure
    pub failures: Vec<TaskFailure>,
}

impl BuildRun {
    /// Conjunction of all leaf outcomes.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Outcome of the leaf named `name`, if it took part in the run.
    pub fn leaf(&self, name: &str) -> Option<&LeafOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// All files written by successful leaves.
    pub fn written(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .flat_map(|o| o.written.iter().cloned())
            .collect()
    }

    /// Count of leaves with the given status kind.
    pub fn count(&self, status: &LeafStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|o| std::mem::discriminant(&o.status) == std::mem::discriminant(status))
            .count()
    }
}

#[derive(Default)]
struct RunLog {
    outcomes: Vec<LeafOutcome>,
    failures: Vec<TaskFailure>,
}

/// Runs tasks from a shared registry.
///
/// The runner provides no mutual exclusion: running the same task twice
/// concurrently races on its outputs. Callers that re-run tasks on demand
/// must serialize per task themselves.
#[derive(Debug, Clone)]
pub struct Runner {
    registry: Arc<TaskRegistry>,
}

impl Runner {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Run the task registered as `name` to completion.
    pub async fn run(&self, name: &str) -> Result<BuildRun, RegistryError> {
        let task = self
            .registry
            .get(name)
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))?;

        let started_at = SystemTime::now();
        let start = Instant::now();
        let log = Mutex::new(RunLog::default());

        tracing::info!("Running '{}'", name);
        self.execute(task, &log).await;

        let log = log.into_inner().unwrap_or_else(|e| e.into_inner());
        let run = BuildRun {
            task: name.to_string(),
            started_at,
            duration: start.elapsed(),
            outcomes: log.outcomes,
            failures: log.failures,
        };

        if run.is_success() {
            tracing::info!("Finished '{}' in {}ms", name, run.duration.as_millis());
        } else {
            tracing::error!(
                "'{}' failed after {}ms ({} failed task(s))",
                name,
                run.duration.as_millis(),
                run.failures.len()
            );
        }

        Ok(run)
    }

    /// Walk `task` depth-first. Returns whether every leaf succeeded.
    fn execute<'a>(&'a self, task: &'a Task, log: &'a Mutex<RunLog>) -> BoxFuture<'a, bool> {
        async move {
            match task {
                Task::Leaf(job) => {
                    let name = job.name().to_string();
                    tracing::info!("Starting '{}'...", name);
                    let start = Instant::now();
                    let result = job.run().await;
                    let duration = start.elapsed();

                    let mut log = log.lock().unwrap_or_else(|e| e.into_inner());
                    match result {
                        Ok(report) => {
                            tracing::info!("Finished '{}' after {}ms", name, duration.as_millis());
                            log.outcomes.push(LeafOutcome {
                                name,
                                status: LeafStatus::Success,
                                duration,
                                written: report.written,
                            });
                            true
                        }
                        Err(error) => {
                            tracing::error!("'{}' errored after {}ms: {}", name, duration.as_millis(), error);
                            log.outcomes.push(LeafOutcome {
                                name: name.clone(),
                                status: LeafStatus::Failed(error.to_string()),
                                duration,
                                written: Vec::new(),
                            });
                            log.failures.push(TaskFailure { task: name, error });
                            false
                        }
                    }
                }

                Task::Ref(name) => match self.registry.get(name) {
                    Some(task) => self.execute(task, log).await,
                    None => {
                        let mut log = log.lock().unwrap_or_else(|e| e.into_inner());
                        log.failures.push(TaskFailure {
                            task: name.clone(),
                            error: TaskError::Misconfigured(format!("unknown task '{name}'")),
                        });
                        false
                    }
                },

                Task::Sequential(tasks) => {
                    for (index, member) in tasks.iter().enumerate() {
                        if !self.execute(member, log).await {
                            self.skip_all(&tasks[index + 1..], log);
                            return false;
                        }
                    }
                    true
                }

                Task::Concurrent(tasks) => {
                    let results = join_all(tasks.iter().map(|t| self.execute(t, log))).await;
                    results.into_iter().all(|ok| ok)
                }
            }
        }
        .boxed()
    }

    fn skip_all(&self, tasks: &[Task], log: &Mutex<RunLog>) {
        let mut names = Vec::new();
        for task in tasks {
            self.leaf_names(task, &mut names);
        }

        let mut log = log.lock().unwrap_or_else(|e| e.into_inner());
        for name in names {
            tracing::debug!("Skipping '{}'", name);
            log.outcomes.push(LeafOutcome {
                name,
                status: LeafStatus::Skipped,
                duration: Duration::ZERO,
                written: Vec::new(),
            });
        }
    }

    fn leaf_names(&self, task: &Task, names: &mut Vec<String>) {
        match task {
            Task::Leaf(job) => names.push(job.name().to_string()),
            Task::Ref(name) => {
                if let Some(task) = self.registry.get(name) {
                    self.leaf_names(task, names);
                }
            }
            Task::Sequential(tasks) | Task::Concurrent(tasks) => {
                for task in tasks {
                    self.leaf_names(task, names);
                }
            }
        }
    }
}
