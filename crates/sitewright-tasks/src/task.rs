//! Task definitions and the pipeline combinators.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;

/// What a leaf job produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    /// Files written to the destination tree
    pub written: Vec<PathBuf>,
}

/// Unit of work wrapped by a leaf task.
#[async_trait]
pub trait Job: Send + Sync {
    /// Name reported in logs and build runs.
    fn name(&self) -> &str;

    /// Execute the job once.
    async fn run(&self) -> Result<JobReport, TaskError>;
}

/// A node in the execution graph.
#[derive(Clone)]
pub enum Task {
    /// Exactly one job, no sub-tasks
    Leaf(Arc<dyn Job>),

    /// Another registered task, by name
    Ref(String),

    /// Members run strictly in order; the first failure stops the rest
    Sequential(Vec<Task>),

    /// Members run together; every failure is reported
    Concurrent(Vec<Task>),
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Leaf(job) => write!(f, "Leaf({})", job.name()),
            Task::Ref(name) => write!(f, "Ref({name})"),
            Task::Sequential(tasks) => f.debug_tuple("Sequential").field(tasks).finish(),
            Task::Concurrent(tasks) => f.debug_tuple("Concurrent").field(tasks).finish(),
        }
    }
}

impl Task {
    /// Names of registered tasks referenced anywhere in this definition.
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Task::Leaf(_) => {}
            Task::Ref(name) => names.push(name),
            Task::Sequential(tasks) | Task::Concurrent(tasks) => {
                for task in tasks {
                    task.collect_references(names);
                }
            }
        }
    }
}

/// Wrap a job as a leaf task.
pub fn leaf(job: impl Job + 'static) -> Task {
    Task::Leaf(Arc::new(job))
}

/// Refer to a registered task by name.
pub fn reference(name: impl Into<String>) -> Task {
    Task::Ref(name.into())
}

/// Run `tasks` strictly in order, aborting on the first failure.
pub fn sequential(tasks: impl IntoIterator<Item = Task>) -> Task {
    Task::Sequential(tasks.into_iter().collect())
}

/// Run `tasks` without ordering constraints and wait for all of them.
pub fn concurrent(tasks: impl IntoIterator<Item = Task>) -> Task {
    Task::Concurrent(tasks.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    #[async_trait]
    impl Job for Noop {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self) -> Result<JobReport, TaskError> {
            Ok(JobReport::default())
        }
    }

    #[test]
    fn collects_nested_references() {
        let task = sequential([
            reference("clean"),
            concurrent([
                sequential([reference("compile"), reference("useref")]),
                leaf(Noop("extra")),
            ]),
        ]);

        assert_eq!(task.references(), vec!["clean", "compile", "useref"]);
    }

    #[test]
    fn debug_names_leaves() {
        let task = concurrent([leaf(Noop("style")), reference("script")]);
        assert_eq!(format!("{task:?}"), "Concurrent([Leaf(style), Ref(script)])");
    }
}
