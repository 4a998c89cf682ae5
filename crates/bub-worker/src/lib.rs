//! The worker protocol (`spec.md` §5, §6) and a concrete thread-pool
//! realization of it.
//!
//! `spec.md` treats the worker executor as an external collaborator and
//! specifies only the message contract: Planner -> worker carries
//! `(action-name, command, target-paths)` or a shutdown sentinel;
//! worker -> Planner carries a `(worker-id, action-name)` completion message,
//! a failure with captured stderr, or a terminated sentinel. This crate
//! defines those message types and ships one concrete transport for them: a
//! fixed pool of OS threads, each running `std::process::Command` against a
//! per-worker scratch directory, communicating over `std::sync::mpsc`.

mod pool;
mod registry;

pub use pool::{WorkItem, WorkerPool};
pub use registry::ChildRegistry;

use std::path::PathBuf;

/// A message sent from the Planner to one specific worker.
#[derive(Debug)]
pub enum ToWorker {
    /// Run this action's resolved command against its target paths.
    Run(WorkItem),
    /// No more work is coming; the worker should acknowledge and exit.
    Shutdown,
}

/// A message sent from a worker back to the Planner.
#[derive(Debug, Clone)]
pub enum FromWorker {
    /// The action's command exited successfully.
    Completed { worker_id: usize, action_name: String },
    /// The action's command exited with a failure. `spec.md` §5/§7 requires
    /// the Planner to cancel the build, capture stderr, and delete the
    /// partial outputs named in `target_paths` -- the worker has already
    /// deleted them by the time this message is sent.
    Failed {
        worker_id: usize,
        action_name: String,
        exit_code: Option<i32>,
        stderr: String,
        target_paths: Vec<PathBuf>,
    },
    /// Sent once, in response to [`ToWorker::Shutdown`].
    Terminated { worker_id: usize },
}
