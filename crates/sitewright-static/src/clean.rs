//! Removes generated output trees.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use sitewright_tasks::{Job, JobReport, TaskError};

/// Deletes `dist` and `temp`. Deleting an absent path succeeds.
#[derive(Debug, Clone)]
pub struct Clean {
    targets: Vec<PathBuf>,
}

impl Clean {
    pub fn new(targets: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            targets: targets.into_iter().collect(),
        }
    }

    /// Remove every target synchronously.
    pub fn remove_all(&self) -> Result<(), TaskError> {
        for target in &self.targets {
            let result = if target.is_dir() {
                fs::remove_dir_all(target)
            } else {
                fs::remove_file(target)
            };

            match result {
                Ok(()) => tracing::debug!("Removed {}", target.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(TaskError::Io(e)),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Job for Clean {
    fn name(&self) -> &str {
        "clean"
    }

    async fn run(&self) -> Result<JobReport, TaskError> {
        let clean = self.clone();
        tokio::task::spawn_blocking(move || clean.remove_all())
            .await
            .map_err(|e| TaskError::Io(std::io::Error::other(e)))??;
        Ok(JobReport::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn removes_trees_and_is_idempotent() {
        let temp = tempdir().unwrap();
        let dist = temp.path().join("dist");
        let scratch = temp.path().join("temp");
        fs::create_dir_all(dist.join("assets")).unwrap();
        fs::write(dist.join("assets/app.js"), "x").unwrap();
        fs::create_dir_all(&scratch).unwrap();

        let clean = Clean::new([dist.clone(), scratch.clone()]);

        clean.run().await.unwrap();
        assert!(!dist.exists());
        assert!(!scratch.exists());

        clean.run().await.unwrap();
        assert!(!dist.exists());
    }

    #[test]
    fn removes_stray_files() {
        let temp = tempdir().unwrap();
        let dist = temp.path().join("dist");
        fs::write(&dist, "not a directory").unwrap();

        Clean::new([dist.clone()]).remove_all().unwrap();
        assert!(!dist.exists());
    }
}
