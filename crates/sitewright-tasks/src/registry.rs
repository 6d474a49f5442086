//! Registry of named tasks.
//!
//! Names are unique and every reference must resolve when a task is
//! registered. Because a task can only refer to tasks registered before it,
//! and registered tasks are never replaced, the composed graph is acyclic by
//! construction.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::task::{Job, Task};

/// Owns every task definition.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Task>,
    order: Vec<String>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` under `name`.
    pub fn register(&mut self, name: impl Into<String>, task: Task) -> Result<(), RegistryError> {
        let name = name.into();

        if self.tasks.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        for referenced in task.references() {
            if referenced == name {
                return Err(RegistryError::Cycle(vec![name.clone(), name]));
            }
            if !self.tasks.contains_key(referenced) {
                return Err(RegistryError::Unknown {
                    task: name,
                    missing: referenced.to_string(),
                });
            }
        }

        tracing::debug!("Registered task '{}'", name);
        self.order.push(name.clone());
        self.tasks.insert(name, task);
        Ok(())
    }

    /// Register a job as a leaf task under its own name.
    pub fn register_job(&mut self, job: impl Job + 'static) -> Result<(), RegistryError> {
        let job: Arc<dyn Job> = Arc::new(job);
        let name = job.name().to_string();
        self.register(name, Task::Leaf(job))
    }

    /// Look up a task by name.
    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::task::{concurrent, reference, sequential, JobReport};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

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
    fn registers_jobs_and_composites() {
        let mut registry = TaskRegistry::new();
        registry.register_job(Noop("style")).unwrap();
        registry.register_job(Noop("script")).unwrap();
        registry
            .register("compile", concurrent([reference("style"), reference("script")]))
            .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), ["style", "script", "compile"]);
        assert!(registry.contains("compile"));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = TaskRegistry::new();
        registry.register_job(Noop("style")).unwrap();

        assert_eq!(
            registry.register_job(Noop("style")),
            Err(RegistryError::Duplicate("style".into()))
        );
    }

    #[test]
    fn rejects_unknown_references() {
        let mut registry = TaskRegistry::new();

        assert_eq!(
            registry.register("build", sequential([reference("clean")])),
            Err(RegistryError::Unknown {
                task: "build".into(),
                missing: "clean".into()
            })
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn rejects_self_reference() {
        let mut registry = TaskRegistry::new();
        registry.register_job(Noop("clean")).unwrap();

        assert_eq!(
            registry.register("loop", sequential([reference("clean"), reference("loop")])),
            Err(RegistryError::Cycle(vec!["loop".into(), "loop".into()]))
        );
    }
}
