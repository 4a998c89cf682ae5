//! A fixed-size pool of OS-thread workers, one of potentially many valid
//! realizations of the protocol in [`crate::ToWorker`]/[`crate::FromWorker`].

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::registry::ChildRegistry;
use crate::{FromWorker, ToWorker};

/// One unit of dispatchable work: an action's resolved shell command and the
/// paths it is expected to produce, so the worker can delete partial output
/// on failure (`spec.md` §5).
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub action_name: String,
    pub command: String,
    pub target_paths: Vec<PathBuf>,
}

/// A pool of `W` worker threads (`spec.md` §5). Each worker has its own
/// inbound channel so the Planner can target dispatch at a specific idle
/// worker; all workers share one outbound channel back to the Planner.
pub struct WorkerPool {
    senders: Vec<Sender<ToWorker>>,
    receiver: Receiver<FromWorker>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` worker threads, each with scratch space under
    /// `scratch_root/worker-<id>` (`spec.md` §5, §6).
    pub fn spawn(count: usize, scratch_root: PathBuf, registry: ChildRegistry) -> Self {
        assert!(count > 0, "a worker pool needs at least one worker");

        let (result_tx, result_rx) = mpsc::channel();
        let mut senders = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for id in 0..count {
            let (work_tx, work_rx) = mpsc::channel();
            let result_tx = result_tx.clone();
            let registry = registry.clone();
            let scratch = scratch_root.join(format!("worker-{id}"));
            let handle = thread::Builder::new()
                .name(format!("bub-worker-{id}"))
                .spawn(move || worker_loop(id, work_rx, result_tx, registry, scratch))
                .expect("failed to spawn worker thread");
            senders.push(work_tx);
            handles.push(handle);
        }

        Self {
            senders,
            receiver: result_rx,
            handles,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Dispatch `item` to a specific idle worker. The Planner is the sole
    /// tracker of which workers are idle (`spec.md` §5 -- no shared state).
    pub fn dispatch(&self, worker_id: usize, item: WorkItem) {
        let _ = self.senders[worker_id].send(ToWorker::Run(item));
    }

    /// Block until any worker reports progress.
    pub fn recv(&self) -> Option<FromWorker> {
        self.receiver.recv().ok()
    }

    /// Ask every worker to shut down and wait for their threads to exit.
    pub fn shutdown_all(self) {
        for sender in &self.senders {
            let _ = sender.send(ToWorker::Shutdown);
        }
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    id: usize,
    rx: Receiver<ToWorker>,
    tx: Sender<FromWorker>,
    registry: ChildRegistry,
    scratch: PathBuf,
) {
    if let Err(e) = std::fs::create_dir_all(&scratch) {
        warn!("worker {id}: failed to create scratch dir {scratch:?}: {e}");
    }

    while let Ok(msg) = rx.recv() {
        match msg {
            ToWorker::Shutdown => {
                let _ = tx.send(FromWorker::Terminated { worker_id: id });
                break;
            }
            ToWorker::Run(item) => run_one(id, item, &tx, &registry, &scratch),
        }
    }
}

fn run_one(id: usize, item: WorkItem, tx: &Sender<FromWorker>, registry: &ChildRegistry, scratch: &std::path::Path) {
    for path in &item.target_paths {
        let _ = bub_common::dirs::ensure_parent(path);
    }

    debug!(action = %item.action_name, "worker {id} running command");

    let mut cmd = shell_command(&item.command);
    cmd.current_dir(scratch);
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            let _ = tx.send(FromWorker::Failed {
                worker_id: id,
                action_name: item.action_name,
                exit_code: None,
                stderr: format!("failed to launch command: {e}"),
                target_paths: item.target_paths,
            });
            return;
        }
    };

    let reg_id = registry.register(&child);
    let stderr = {
        use std::io::Read;
        let mut buf = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    };
    let status = child.wait();
    registry.unregister(reg_id);

    match status {
        Ok(status) if status.success() => {
            let _ = tx.send(FromWorker::Completed {
                worker_id: id,
                action_name: item.action_name,
            });
        }
        Ok(status) => {
            for path in &item.target_paths {
                let _ = std::fs::remove_file(path);
            }
            let _ = tx.send(FromWorker::Failed {
                worker_id: id,
                action_name: item.action_name,
                exit_code: status.code(),
                stderr,
                target_paths: item.target_paths,
            });
        }
        Err(e) => {
            let _ = tx.send(FromWorker::Failed {
                worker_id: id,
                action_name: item.action_name,
                exit_code: None,
                stderr: format!("{stderr}\nfailed to wait on child: {e}"),
                target_paths: item.target_paths,
            });
        }
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
