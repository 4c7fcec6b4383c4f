//! Registry of live agent processes, keyed by OS pid.
//!
//! Every agent invocation parks its [`Child`] here for the duration of the
//! run. Ownership of an entry leaves the map exactly once: either the launch
//! path takes it back after the pipes reach EOF, or the shutdown drain takes
//! it to terminate the process. Whichever side loses the race sees `None`
//! and treats that as "already handled". A drain also closes the registry
//! for good: a child registered after that is killed on the spot, so nothing
//! spawned during shutdown escapes termination.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default grace period between SIGTERM and SIGKILL when draining.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Default)]
struct RegistryInner {
    processes: HashMap<u32, Child>,
    /// Set once by the shutdown drain; never cleared.
    closed: bool,
}

/// Shared, clonable registry of running agent subprocesses.
///
/// Clones share the same underlying map, so the HTTP state and the shutdown
/// coordinator can hold the registry independently.
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly spawned child under its pid.
    ///
    /// Pids are unique among live processes, so an existing entry under the
    /// same pid is stale; it is replaced. Once a drain has closed the
    /// registry the child is killed and reaped here instead of tracked; its
    /// launch path then sees the same `None` a drained entry would.
    pub async fn register(&self, pid: u32, mut child: Child) {
        {
            let mut inner = self.inner.lock().await;
            if !inner.closed {
                if inner.processes.insert(pid, child).is_some() {
                    warn!(pid, "replaced stale registry entry");
                }
                debug!(pid, tracked = inner.processes.len(), "registered agent process");
                return;
            }
        }
        warn!(pid, "registry closed by shutdown, killing late agent process");
        if let Err(e) = child.kill().await {
            warn!(pid, error = %e, "failed to kill late agent process");
        }
    }

    /// Remove and return the child for `pid`, if it is still tracked.
    ///
    /// Returns `None` when the entry is already gone, either because it was
    /// never registered or because the shutdown drain claimed it first.
    /// Unregistering twice is harmless.
    pub async fn unregister(&self, pid: u32) -> Option<Child> {
        let child = self.inner.lock().await.processes.remove(&pid);
        if child.is_none() {
            debug!(pid, "unregister: process not tracked (drained already?)");
        }
        child
    }

    /// Number of processes currently tracked.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.processes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.processes.is_empty()
    }

    /// Close the registry and terminate every tracked process.
    ///
    /// Closing is permanent: a child registered after this point is killed
    /// at registration instead of tracked. Each drained process gets a
    /// SIGTERM, up to `grace` to exit on its own, and a SIGKILL if it is
    /// still around after that. Failures along the way are logged and never
    /// interrupt the drain; by the time this runs there is no caller left
    /// to hand an error to.
    pub async fn drain(&self, grace: Duration) {
        let drained: Vec<(u32, Child)> = {
            let mut inner = self.inner.lock().await;
            inner.closed = true;
            inner.processes.drain().collect()
        };

        if drained.is_empty() {
            debug!("shutdown drain: no agent processes tracked");
            return;
        }

        info!(count = drained.len(), "terminating tracked agent processes");
        for (pid, mut child) in drained {
            terminate_with_grace(pid, &mut child, grace).await;
        }
    }
}

/// SIGTERM, bounded wait, SIGKILL.
async fn terminate_with_grace(pid: u32, child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        // SAFETY: sending a signal to a pid we spawned and still own.
        let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if ret != 0 {
            debug!(pid, "SIGTERM failed (process may have exited)");
        }
    }

    let exited = tokio::time::timeout(grace, child.wait()).await;
    match exited {
        Ok(Ok(status)) => {
            info!(pid, ?status, "agent exited after SIGTERM");
        }
        Ok(Err(e)) => {
            warn!(pid, error = %e, "wait after SIGTERM failed; sending SIGKILL");
            if let Err(e) = child.kill().await {
                warn!(pid, error = %e, "SIGKILL failed");
            }
        }
        Err(_) => {
            warn!(pid, "agent did not exit in time; sending SIGKILL");
            if let Err(e) = child.kill().await {
                warn!(pid, error = %e, "SIGKILL failed");
            }
        }
    }
}
