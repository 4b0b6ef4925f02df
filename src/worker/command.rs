//! How a worker process is launched.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::config::WorkerConfig;
use crate::worker::error::WorkerError;

/// Executable, arguments, and working directory for the worker.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Start the process with piped stdin/stdout and inherited stderr.
    ///
    /// The child is killed if its handle is dropped.
    pub fn spawn(&self) -> Result<Child, WorkerError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| WorkerError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        tracing::debug!(
            program = %self.program,
            args = ?self.args,
            pid = child.id(),
            "Worker process spawned"
        );
        Ok(child)
    }
}
