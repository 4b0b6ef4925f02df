//! One process per request.
//!
//! The Environment record is written to stdin, stdin is closed, and stdout is
//! read to EOF. Requests share nothing, so dispatches run without locking.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;

use crate::config::{GatewayConfig, WorkerMode};
use crate::http::Environment;
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;
use crate::worker::command::WorkerCommand;
use crate::worker::error::WorkerError;
use crate::worker::Dispatcher;

pub struct PerRequestWorker {
    command: WorkerCommand,
    timeout: Duration,
    max_response_bytes: usize,
}

impl PerRequestWorker {
    pub fn new(command: WorkerCommand, timeout: Duration, max_response_bytes: usize) -> Self {
        Self {
            command,
            timeout,
            max_response_bytes,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            WorkerCommand::from_config(&config.worker),
            config.timeouts.worker(),
            config.worker.max_response_bytes,
        )
    }

    async fn run(&self, mut child: Child, record: Vec<u8>) -> Result<Bytes, WorkerError> {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::BrokenChannel("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::BrokenChannel("stdout not captured".to_string()))?;

        // A worker may answer without reading its input.
        match stdin.write_all(&record).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!("Worker closed stdin before reading the request");
            }
            Err(e) => return Err(WorkerError::broken("write to worker failed", e)),
        }
        drop(stdin);

        let output = read_bounded(stdout, self.max_response_bytes).await?;

        let status = child
            .wait()
            .await
            .map_err(|e| WorkerError::broken("wait for worker failed", e))?;

        if status.success() {
            Ok(output)
        } else {
            Err(WorkerError::Failure { status, output })
        }
    }
}

/// Read to EOF, failing once more than `limit` bytes arrive.
async fn read_bounded<R>(reader: R, limit: usize) -> Result<Bytes, WorkerError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = BytesMut::new();
    let mut bounded = reader.take(limit as u64 + 1);
    loop {
        buf.reserve(4096);
        let n = bounded
            .read_buf(&mut buf)
            .await
            .map_err(|e| WorkerError::broken("read from worker failed", e))?;
        if n == 0 {
            break;
        }
        if buf.len() > limit {
            return Err(WorkerError::ResponseTooLarge { limit });
        }
    }
    Ok(buf.freeze())
}

#[async_trait]
impl Dispatcher for PerRequestWorker {
    async fn dispatch(&self, env: Environment) -> Result<Bytes, WorkerError> {
        let record = env.to_wire()?;
        let child = self.command.spawn()?;
        let pid = child.id();
        metrics::record_worker_spawn(WorkerMode::PerRequest);

        // The child is killed on drop, which covers the timeout path.
        let result = with_timeout(self.timeout, self.run(child, record))
            .await
            .unwrap_or(Err(WorkerError::Timeout(self.timeout)));

        if let Err(e) = &result {
            tracing::debug!(pid, error = %e, "Worker invocation failed");
        }
        result
    }

    async fn shutdown(&self) {}

    fn mode(&self) -> WorkerMode {
        WorkerMode::PerRequest
    }
}
