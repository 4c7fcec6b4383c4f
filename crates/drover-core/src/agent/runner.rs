//! Agent subprocess launcher.
//!
//! Spawns the agent entrypoint, parks the child in the [`ProcessRegistry`]
//! for the duration of the run, and captures stdout and stderr in full once
//! the pipes close. [`AgentRunner::run`] folds launch failures into a
//! synthetic [`AgentOutcome`] so callers handle exactly one shape, the same
//! way a failing agent run would look; [`AgentRunner::try_run`] keeps them
//! as errors for callers that must tell the two apart.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use super::credentials;
use crate::registry::ProcessRegistry;

/// Captured result of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutcome {
    /// Exit code of the process. `-1` when it died to a signal or was
    /// reaped by the shutdown drain; `1` for synthetic launch failures.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl AgentOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The uniform shape for a run that never produced a usable process.
    fn launch_failure(error: &LaunchError) -> Self {
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: format!("Exception: {error}"),
        }
    }
}

/// Failures on the launch path, before or around the agent process itself.
///
/// [`AgentRunner::run`] renders these into the synthetic outcome's stderr;
/// [`AgentRunner::try_run`] returns them so a caller can distinguish "the
/// binary would not start" from "the agent ran and failed".
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to prepare agent environment: {0:#}")]
    Environment(anyhow::Error),
    #[error("failed to spawn agent binary '{path}': {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("spawned agent process reported no pid")]
    MissingPid,
    #[error("agent process pipes were not captured")]
    MissingPipes,
    #[error("failed to capture agent output: {0}")]
    Capture(#[source] std::io::Error),
    #[error("failed waiting for agent exit: {0}")]
    Wait(#[source] std::io::Error),
}

/// Launches the external agent entrypoint and tracks every live child in a
/// shared [`ProcessRegistry`] so shutdown can terminate them.
///
/// Cloning is cheap and clones share the registry.
#[derive(Clone)]
pub struct AgentRunner {
    binary_path: String,
    agent_home: PathBuf,
    registry: ProcessRegistry,
}

impl AgentRunner {
    pub fn new(
        binary_path: impl Into<String>,
        agent_home: impl Into<PathBuf>,
        registry: ProcessRegistry,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            agent_home: agent_home.into(),
            registry,
        }
    }

    /// The registry this runner registers children in.
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    pub fn agent_home(&self) -> &Path {
        &self.agent_home
    }

    /// Run the agent to completion and capture its output.
    ///
    /// A non-empty `api_key` is written into the agent's config file before
    /// the spawn. Infallible by construction: anything that goes wrong
    /// before the process produces a result is folded into a synthetic
    /// outcome with exit code 1 and an `Exception:` stderr.
    pub async fn run(&self, args: &[String], api_key: Option<&str>) -> AgentOutcome {
        let invocation = Uuid::new_v4();
        info!(
            %invocation,
            binary = %self.binary_path,
            args = args.len(),
            "launching agent"
        );

        match self.try_run(args, api_key).await {
            Ok(outcome) => {
                info!(%invocation, exit_code = outcome.exit_code, "agent run finished");
                outcome
            }
            Err(error) => {
                warn!(%invocation, %error, "agent launch failed");
                AgentOutcome::launch_failure(&error)
            }
        }
    }

    /// Like [`run`](Self::run), but launch failures come back as errors
    /// instead of folding into the synthetic outcome. The diagnostic probe
    /// uses this to answer differently when the binary itself cannot start.
    pub async fn try_run(
        &self,
        args: &[String],
        api_key: Option<&str>,
    ) -> Result<AgentOutcome, LaunchError> {
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            credentials::apply_credential(&self.agent_home, key)
                .map_err(LaunchError::Environment)?;
        }
        credentials::prepare_dirs(&self.agent_home).map_err(LaunchError::Environment)?;

        let mut child = Command::new(&self.binary_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                path: self.binary_path.clone(),
                source,
            })?;

        let pid = child.id().ok_or(LaunchError::MissingPid)?;
        let mut stdout_pipe = child.stdout.take().ok_or(LaunchError::MissingPipes)?;
        let mut stderr_pipe = child.stderr.take().ok_or(LaunchError::MissingPipes)?;

        // The child itself lives in the registry while we hold the pipes,
        // so a shutdown drain can terminate it mid-run.
        self.registry.register(pid, child).await;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let (stdout_read, stderr_read) = tokio::join!(
            stdout_pipe.read_to_end(&mut stdout),
            stderr_pipe.read_to_end(&mut stderr),
        );

        if let Err(error) = stdout_read.and(stderr_read) {
            // The pipes broke with the child possibly still alive; kill it
            // rather than wait on a process we can no longer observe.
            if let Some(mut child) = self.registry.unregister(pid).await {
                if let Err(kill_error) = child.kill().await {
                    warn!(pid, error = %kill_error, "failed to kill agent after capture error");
                }
            }
            return Err(LaunchError::Capture(error));
        }

        // EOF on both pipes: the process has exited (or is exiting), so the
        // wait below returns promptly.
        let exit_code = match self.registry.unregister(pid).await {
            Some(mut child) => {
                let status = child.wait().await.map_err(LaunchError::Wait)?;
                // A signal death has no exit code; report -1 like a shell.
                status.code().unwrap_or(-1)
            }
            None => {
                warn!(pid, "agent process was reaped by the shutdown drain");
                -1
            }
        };

        Ok(AgentOutcome {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}
