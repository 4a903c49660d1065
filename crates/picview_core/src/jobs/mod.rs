//! Asynchronous image jobs.
//!
//! - [`Job`]: handle for one outstanding operation (load, transform, save,
//!   save-as, copy) with progress, per-item results and a terminal outcome
//! - [`JobQueue`]: executor seam; [`WorkerQueue`] runs jobs on a worker thread
//! - [`JobRunner`]: what a worker does with a job; [`FsJobRunner`] works on
//!   local files

mod job;
mod queue;
mod runner;

pub use job::{
    ItemResult, Job, JobCategory, JobFailure, JobId, JobKind, JobOutcome, JobSignal, JobSlot,
    SaveAsTarget,
};
pub use queue::{JobQueue, WorkerQueue};
pub use runner::{FsJobRunner, JobRunner, RunnerError};

#[cfg(test)]
pub(crate) use queue::testing;
