//! Task descriptors and the execution boundary.
//!
//! The REST layer never talks to Docker directly. It builds a [`TaskSpec`],
//! hands it to a [`Dispatcher`], and stores the job record it gets back.
//! The runner behind the trait owns the job's state machine
//! (queued -> running -> succeeded | failed) and updates the stored record
//! asynchronously; nothing on the submitting side observes execution
//! synchronously, and there is no cancellation path.

pub mod docker;

pub use docker::DockerRunner;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::store::{EntityId, Job, User};

/// Name of the results directory bound into the container for the
/// output-path placeholder.
pub const RESULTS_DIR: &str = "__results__";

/// One container argument, resolved to a concrete string by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Passed through verbatim.
    Literal(String),
    /// A folder's contents mounted read-only; resolves to the mount path.
    FolderVolume(EntityId),
    /// A single file mounted read-only; resolves to the file's mounted path.
    FileVolume(EntityId),
    /// The writable results directory; resolves to its mount path.
    OutputPath,
}

/// Post-completion action run by the runner after a successful exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultHook {
    /// Upload everything under the results path into a folder.
    UploadToFolder(EntityId),
}

/// A single container-execution request.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub image: String,
    pub args: Vec<Arg>,
    pub title: String,
    pub hooks: Vec<ResultHook>,
}

/// Execution seam. `submit` synchronously returns a just-scheduled job
/// record; the actual run happens out of band.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn submit(&self, spec: TaskSpec, owner: &User) -> Result<Job, ApiError>;
}
