//! Task orchestration engine for sitewright.
//!
//! Declares named build steps, composes them into sequential and concurrent
//! execution graphs, and runs them against the files a glob group matches.

pub mod error;
pub mod file;
pub mod matcher;
pub mod registry;
pub mod runner;
pub mod stage;
pub mod task;

pub use error::{MatchError, RegistryError, TaskError, TransformError, WriteError};
pub use file::FileDescriptor;
pub use matcher::{match_files, GlobGroup, MatchedFiles};
pub use registry::TaskRegistry;
pub use runner::{BuildRun, LeafOutcome, LeafStatus, Runner, TaskFailure};
pub use stage::{map_each, transform_fn, write_files, Stage, Transform};
pub use task::{concurrent, leaf, reference, sequential, Job, JobReport, Task};
