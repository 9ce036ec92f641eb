//! Process Runner
//!
//! Executes the provisioned binary under an explicitly constructed
//! environment and captures its output. The [`RuntimeBundle`] decides the
//! invocation shape in exactly one place: a bundled loader means the loader
//! is invoked with `--library-path`, pinning the intended libraries even if
//! the ambient environment is hostile; otherwise the binary runs directly
//! and relies on `LD_LIBRARY_PATH` alone.
//!
//! Cancellation is tokio-native: the child is spawned with
//! `kill_on_drop(true)`, so both the timeout below and a caller dropping
//! the future terminate it promptly.

use crate::provision::RuntimeBundle;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default wall-clock limit for one command.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Error types for process launch and supervision
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("binary not found: {0}")]
    NotFound(PathBuf),

    #[error("permission denied running {0}")]
    PermissionDenied(PathBuf),

    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("command timed out after {0:?}")]
    TimedOut(Duration),
}

/// Captured outcome of one invocation.
///
/// A non-zero exit code is data, not an error: launch-level failures are
/// [`ExecError`], everything after a successful spawn lands here.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout and stderr concatenated, trimmed, for error-style rendering.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim().to_string();
        let err = self.stderr.trim();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// Runs bundle binaries with full output capture and a timeout guard.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run the bundle's binary with `args` under `env`.
    ///
    /// stdout and stderr are captured in full; outputs here are
    /// human-scale text, not bulk streams.
    pub async fn run(
        &self,
        bundle: &RuntimeBundle,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, ExecError> {
        let mut command = match &bundle.loader {
            Some(loader) => {
                debug!(loader = %loader.display(), binary = %bundle.binary.display(), "loader-mediated invocation");
                let mut command = Command::new(loader);
                command
                    .arg("--library-path")
                    .arg(bundle.library_path().unwrap_or_default())
                    .arg(&bundle.binary)
                    .args(args);
                command
            }
            None => {
                debug!(binary = %bundle.binary.display(), "direct invocation");
                let mut command = Command::new(&bundle.binary);
                command.args(args);
                command
            }
        };

        let program = bundle.loader.as_ref().unwrap_or(&bundle.binary).clone();
        command
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(binary = %bundle.binary.display(), args = ?args, "executing command");

        let child = command
            .spawn()
            .map_err(|source| classify_spawn_error(source, program.clone()))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ExecError::Spawn {
                binary: program,
                source,
            })?,
            Err(_) => {
                // kill_on_drop reaps the child as the future is dropped.
                warn!(timeout = ?self.timeout, "command timed out");
                return Err(ExecError::TimedOut(self.timeout));
            }
        };

        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

fn classify_spawn_error(source: io::Error, binary: PathBuf) -> ExecError {
    match source.kind() {
        io::ErrorKind::NotFound => ExecError::NotFound(binary),
        io::ErrorKind::PermissionDenied => ExecError::PermissionDenied(binary),
        _ => ExecError::Spawn { binary, source },
    }
}
