//! Execution Orchestrator
//!
//! Composes the pipeline into the single request/response cycle:
//! normalize → authorize → provision → build environment → run → format.
//! Authorization failures and provisioning failures are terminal; a
//! non-zero exit code is not; it is forwarded to formatting, which picks
//! the error-style rendering. Every path produces a message; nothing is
//! silently dropped.

use crate::authz;
use crate::config::ExecutorConfig;
use crate::environment::build_env;
use crate::provision::Provisioner;
use crate::render::Message;
use crate::runner::{ExecutionResult, ProcessRunner};
use std::io;
use tracing::{debug, info};

/// The request/response cycle over a merged configuration.
pub struct AwsExecutor {
    config: ExecutorConfig,
    provisioner: Provisioner,
    runner: ProcessRunner,
}

impl AwsExecutor {
    /// Executor with the default cache location, fetcher, and runner.
    pub fn new(config: ExecutorConfig) -> io::Result<Self> {
        Ok(Self {
            config,
            provisioner: Provisioner::new()?,
            runner: ProcessRunner::new(),
        })
    }

    /// Executor over explicit collaborators; the seam used by tests and
    /// embedders.
    pub fn with_parts(
        config: ExecutorConfig,
        provisioner: Provisioner,
        runner: ProcessRunner,
    ) -> Self {
        Self {
            config,
            provisioner,
            runner,
        }
    }

    /// Run one raw command string through the full cycle.
    pub async fn execute(&self, raw_command: &str) -> Message {
        let command = authz::normalize(raw_command);

        if !authz::is_allowed(&command, &self.config.allowed) {
            info!(command = %command, "command rejected by allow-list");
            return Message::plain(format!("Command not allowed: {command:?}"));
        }

        // Prepend-args apply after authorization so the allow-list sees
        // exactly what the administrator wrote.
        let command = if self.config.prepend_args.is_empty() {
            command
        } else {
            format!("{} {}", self.config.prepend_args.join(" "), command)
        };

        let args = match shell_words::split(&command) {
            Ok(args) => args,
            Err(err) => return Message::plain(format!("invalid arguments: {err}")),
        };

        let bundle = match self.provisioner.ensure().await {
            Ok(bundle) => bundle,
            Err(err) => return Message::plain(format!("failed to prepare aws cli: {err}")),
        };

        let library_path = bundle.library_path();
        let env = build_env(&self.config, library_path.as_deref());
        debug!(binary = %bundle.binary.display(), loader = ?bundle.loader, "environment built");

        match self.runner.run(&bundle, &args, &env).await {
            Ok(result) => format_result(&result),
            Err(err) => Message::plain(format!("ERROR: {err}")),
        }
    }
}

/// Choose the rendering for a completed invocation.
fn format_result(result: &ExecutionResult) -> Message {
    if result.success() {
        let out = result.stdout.trim();
        if out.is_empty() {
            Message::code("(no output)")
        } else {
            Message::code(out)
        }
    } else {
        let status = match result.exit_code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        let output = result.combined();
        if output.is_empty() {
            Message::plain(format!("ERROR: {status}"))
        } else {
            Message::plain(format!("{output}\nERROR: {status}"))
        }
    }
}
