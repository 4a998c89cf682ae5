//! A registry of currently-running child processes, so a process-level
//! signal handler (`spec.md` §5) can terminate every in-flight worker
//! command without each worker thread having to poll a flag mid-`wait()`.

use std::collections::HashMap;
use std::process::Child;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

#[derive(Default, Clone)]
pub struct ChildRegistry {
    children: Arc<Mutex<HashMap<u32, u32>>>, // registration id -> pid
    next_id: Arc<AtomicU32>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly-spawned child, returning a handle to unregister it
    /// with later.
    pub fn register(&self, child: &Child) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut children) = self.children.lock() {
            children.insert(id, child.id());
        }
        id
    }

    pub fn unregister(&self, id: u32) {
        if let Ok(mut children) = self.children.lock() {
            children.remove(&id);
        }
    }

    /// Send a termination signal to every still-registered child. Called
    /// from the process-level signal handler's cancellation path.
    pub fn terminate_all(&self) {
        let pids: Vec<u32> = match self.children.lock() {
            Ok(children) => children.values().copied().collect(),
            Err(_) => return,
        };
        info!("terminating {} in-flight worker command(s)", pids.len());
        for pid in pids {
            kill(pid);
        }
    }
}

#[cfg(unix)]
fn kill(pid: u32) {
    // SAFETY: `pid` was obtained from `Child::id()` of a process we spawned
    // and may already have exited; `kill` on a reaped pid is a documented
    // no-op failure, not undefined behavior.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        warn!("failed to send SIGTERM to worker child process {pid}");
    }
}

#[cfg(not(unix))]
fn kill(_pid: u32) {
    warn!("child process termination on signal is not implemented on this platform");
}
