//! Transform stages: match, transform in order, write.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use rayon::prelude::*;

use crate::error::{TaskError, TransformError, WriteError};
use crate::file::FileDescriptor;
use crate::matcher::{match_files, GlobGroup};
use crate::task::{Job, JobReport};

/// A pluggable conversion over a sequence of files.
///
/// Implementations must not mutate shared state: they receive owned
/// descriptors and return new ones. Per-file rejections are reported as
/// [`TaskError::Transform`] with every failing file; a transform that cannot
/// run at all returns [`TaskError::Misconfigured`].
pub trait Transform: Send + Sync {
    /// Step identifier used in logs (e.g. "scss", "minify").
    fn name(&self) -> &str;

    /// Transform the whole sequence.
    fn apply(&self, files: Vec<FileDescriptor>) -> Result<Vec<FileDescriptor>, TaskError>;
}

/// Apply `f` to every file in parallel, keeping input order.
///
/// `Ok(None)` drops the file from the output. All failures are collected
/// rather than stopping at the first one.
pub fn map_each<F>(files: Vec<FileDescriptor>, f: F) -> Result<Vec<FileDescriptor>, TaskError>
where
    F: Fn(FileDescriptor) -> Result<Option<FileDescriptor>, TransformError> + Send + Sync,
{
    let results: Vec<_> = files.into_par_iter().map(f).collect();

    let mut output = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(Some(file)) => output.push(file),
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(output)
    } else {
        Err(TaskError::Transform(errors))
    }
}

/// Write every file to `dest`, keeping its relative path.
///
/// Returns the written paths in input order.
pub fn write_files(files: &[FileDescriptor], dest: &Path) -> Result<Vec<PathBuf>, WriteError> {
    let mut written = Vec::with_capacity(files.len());

    for file in files {
        let target = dest.join(file.relative());
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| WriteError {
                path: parent.to_path_buf(),
                cause: e.to_string(),
            })?;
        }
        fs::write(&target, file.contents()).map_err(|e| WriteError {
            path: target.clone(),
            cause: e.to_string(),
        })?;
        written.push(target);
    }

    Ok(written)
}

/// Closure-backed transform.
struct FnTransform<F> {
    name: String,
    f: F,
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(Vec<FileDescriptor>) -> Result<Vec<FileDescriptor>, TaskError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, files: Vec<FileDescriptor>) -> Result<Vec<FileDescriptor>, TaskError> {
        (self.f)(files)
    }
}

/// Build a transform from a closure.
pub fn transform_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn Transform>
where
    F: Fn(Vec<FileDescriptor>) -> Result<Vec<FileDescriptor>, TaskError> + Send + Sync + 'static,
{
    Arc::new(FnTransform {
        name: name.into(),
        f,
    })
}

/// A leaf job: read a glob group, apply transforms in order, write to `dest`.
#[derive(Clone)]
pub struct Stage {
    name: String,
    source: GlobGroup,
    steps: Vec<Arc<dyn Transform>>,
    dest: PathBuf,
    source_maps: bool,
    optional: bool,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("source", &self.source)
            .field(
                "steps",
                &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("dest", &self.dest)
            .finish()
    }
}

impl Stage {
    pub fn new(name: impl Into<String>, source: GlobGroup, dest: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source,
            steps: Vec::new(),
            dest: dest.into(),
            source_maps: false,
            optional: false,
        }
    }

    /// Append a transform step.
    pub fn pipe(mut self, step: Arc<dyn Transform>) -> Self {
        self.steps.push(step);
        self
    }

    /// Mark matched files as wanting source maps.
    pub fn source_maps(mut self, enabled: bool) -> Self {
        self.source_maps = enabled;
        self
    }

    /// Treat a missing source directory as an empty match set.
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn source(&self) -> &GlobGroup {
        &self.source
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Run the stage synchronously.
    pub fn process(&self) -> Result<JobReport, TaskError> {
        if self.optional && !self.source.cwd().is_dir() {
            tracing::debug!(
                "{}: {} does not exist, nothing to do",
                self.name,
                self.source.cwd().display()
            );
            return Ok(JobReport::default());
        }

        let mut files = match_files(&self.source)?
            .map(|f| f.map(|f| f.with_source_map(self.source_maps)))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("{}: matched {} file(s)", self.name, files.len());

        for step in &self.steps {
            let start = Instant::now();
            files = step.apply(files)?;
            tracing::debug!(
                "{}: {} -> {} file(s) in {}ms",
                self.name,
                step.name(),
                files.len(),
                start.elapsed().as_millis()
            );
        }

        let written = write_files(&files, &self.dest)?;
        Ok(JobReport { written })
    }
}

#[async_trait]
impl Job for Stage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<JobReport, TaskError> {
        let stage = self.clone();
        tokio::task::spawn_blocking(move || stage.process())
            .await
            .map_err(|e| TaskError::Io(std::io::Error::other(e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MatchError;
    use crate::registry::TaskRegistry;
    use crate::runner::{LeafStatus, Runner};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn uppercase() -> Arc<dyn Transform> {
        transform_fn("uppercase", |files| {
            map_each(files, |file| {
                let text = file
                    .text()
                    .ok_or_else(|| TransformError::new(file.relative(), "not utf-8"))?
                    .to_uppercase();
                Ok(Some(file.with_contents(text)))
            })
        })
    }

    #[test]
    fn map_each_collects_every_failure() {
        let files = vec![
            FileDescriptor::new("src", "ok.txt", b"fine".to_vec()),
            FileDescriptor::new("src", "bad1.txt", vec![0xff]),
            FileDescriptor::new("src", "bad2.txt", vec![0xfe]),
        ];

        let err = uppercase().apply(files).unwrap_err();
        match err {
            TaskError::Transform(errors) => {
                let paths: Vec<_> = errors.iter().map(|e| e.path.clone()).collect();
                assert_eq!(paths, vec![PathBuf::from("bad1.txt"), PathBuf::from("bad2.txt")]);
            }
            other => panic!("expected transform errors, got {other:?}"),
        }
    }

    #[test]
    fn map_each_keeps_order_and_drops_none() {
        let files = (0..20)
            .map(|i| FileDescriptor::new("src", format!("{i}.txt"), vec![]))
            .collect();

        let output = map_each(files, |file| {
            let keep = file.relative().to_string_lossy() != "3.txt";
            Ok(keep.then_some(file))
        })
        .unwrap();

        assert_eq!(output.len(), 19);
        assert_eq!(output[0].relative(), Path::new("0.txt"));
        assert_eq!(output[3].relative(), Path::new("4.txt"));
    }

    #[test]
    fn stage_writes_transformed_files() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        let out = temp.path().join("out");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.txt"), "alpha").unwrap();
        fs::write(src.join("nested/b.txt"), "beta").unwrap();
        fs::write(src.join("skip.md"), "no").unwrap();

        let stage = Stage::new("shout", GlobGroup::new(&src, ["**/*.txt"]).unwrap(), &out)
            .pipe(uppercase());
        let report = stage.process().unwrap();

        assert_eq!(report.written.len(), 2);
        assert_eq!(fs::read_to_string(out.join("a.txt")).unwrap(), "ALPHA");
        assert_eq!(fs::read_to_string(out.join("nested/b.txt")).unwrap(), "BETA");
        assert!(!out.join("skip.md").exists());
    }

    #[test]
    fn stage_fails_on_missing_directory() {
        let temp = tempdir().unwrap();
        let stage = Stage::new(
            "missing",
            GlobGroup::new(temp.path().join("nope"), ["**"]).unwrap(),
            temp.path().join("out"),
        );

        assert!(matches!(
            stage.process(),
            Err(TaskError::Match(MatchError::NotFound(_)))
        ));
    }

    #[test]
    fn optional_stage_tolerates_missing_directory() {
        let temp = tempdir().unwrap();
        let stage = Stage::new(
            "extra",
            GlobGroup::new(temp.path().join("public"), ["**"]).unwrap(),
            temp.path().join("out"),
        )
        .optional(true);

        assert!(stage.process().unwrap().written.is_empty());
    }

    #[test]
    fn failed_stage_writes_nothing() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        let out = temp.path().join("out");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("good.txt"), "ok").unwrap();
        fs::write(src.join("bad.txt"), [0xffu8]).unwrap();

        let stage = Stage::new("shout", GlobGroup::new(&src, ["*.txt"]).unwrap(), &out)
            .pipe(uppercase());

        assert!(stage.process().is_err());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn unwritable_destination_fails_the_leaf() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        let out = temp.path().join("out");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.txt"), "alpha").unwrap();
        fs::write(&out, "not a directory").unwrap();

        let stage = Stage::new("copy", GlobGroup::new(&src, ["*.txt"]).unwrap(), &out);
        match stage.process() {
            Err(TaskError::Write(err)) => assert_eq!(err.path, out),
            other => panic!("expected a write error, got {other:?}"),
        }

        let mut registry = TaskRegistry::new();
        registry.register_job(stage).unwrap();
        let run = Runner::new(Arc::new(registry)).run("copy").await.unwrap();

        assert!(!run.is_success());
        assert_eq!(run.failures.len(), 1);
        assert!(matches!(run.failures[0].error, TaskError::Write(_)));
        assert!(matches!(
            run.leaf("copy").unwrap().status,
            LeafStatus::Failed(_)
        ));
    }

    #[tokio::test]
    async fn runs_as_job() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.txt"), "x").unwrap();

        let stage = Stage::new("copy", GlobGroup::new(&src, ["*"]).unwrap(), temp.path().join("out"))
            .source_maps(true);

        assert_eq!(Job::name(&stage), "copy");
        let report = stage.run().await.unwrap();
        assert_eq!(report.written, vec![temp.path().join("out/a.txt")]);
    }
}
