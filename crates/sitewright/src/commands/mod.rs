//! Subcommand implementations.

use std::path::Path;

use anyhow::{Context, Result};
use sitewright_static::{production_from_env, SiteConfig};
use sitewright_tasks::{BuildRun, LeafStatus};

pub mod build;
pub mod clean;
pub mod develop;

/// Production mode: a set environment wins over the `--production` flag.
pub fn resolve_production(flag: bool) -> bool {
    production_from_env().unwrap_or(flag)
}

/// Load the config snapshot for this process.
pub fn load_config(path: &Path, production: bool) -> Result<SiteConfig> {
    let config = SiteConfig::load(path)
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    if production {
        tracing::info!("Production mode");
    }
    Ok(config.production(production))
}

/// Log every leaf outcome and a one-line summary.
pub fn report(run: &BuildRun) {
    for outcome in &run.outcomes {
        match &outcome.status {
            LeafStatus::Success => tracing::debug!(
                "  {} ok in {}ms ({} file(s))",
                outcome.name,
                outcome.duration.as_millis(),
                outcome.written.len()
            ),
            LeafStatus::Failed(_) => {
                tracing::debug!("  {} failed in {}ms", outcome.name, outcome.duration.as_millis())
            }
            LeafStatus::Skipped => tracing::debug!("  {} skipped", outcome.name),
        }
    }

    for failure in &run.failures {
        tracing::error!("'{}' failed: {}", failure.task, failure.error);
    }

    tracing::info!(
        "'{}': {} succeeded, {} failed, {} skipped, {} file(s) written in {}ms",
        run.task,
        run.count(&LeafStatus::Success),
        run.failures.len(),
        run.count(&LeafStatus::Skipped),
        run.written().len(),
        run.duration.as_millis()
    );
}

/// Turn a failed run into an error so the process exits non-zero.
pub fn ensure_success(run: &BuildRun) -> Result<()> {
    if run.is_success() {
        Ok(())
    } else {
        anyhow::bail!("'{}' failed: {} task(s) failed", run.task, run.failures.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_config_uses_defaults() {
        let temp = tempdir().unwrap();
        let config = load_config(&temp.path().join("sitewright.toml"), true).unwrap();

        assert_eq!(config.dist, temp.path().join("dist"));
        assert!(config.production);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("sitewright.toml");
        fs::write(&path, "src = [").unwrap();

        assert!(load_config(&path, false).is_err());
    }
}
