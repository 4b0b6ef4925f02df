//! Long-lived worker supervision.
//!
//! One process serves every request. The channel has no request IDs, so
//! exchanges are serialized behind an async mutex: a request is written and
//! its full response read before anyone else touches the pipes.
//!
//! A session that dies, times out, or returns a malformed frame is torn down;
//! the next dispatch spawns a replacement, backing off after consecutive
//! spawn failures.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::config::{GatewayConfig, WorkerMode};
use crate::http::Environment;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::timeouts::with_timeout;
use crate::worker::codec::{CodecError, EnvironmentEncoder, ResponseDecoder};
use crate::worker::command::WorkerCommand;
use crate::worker::error::WorkerError;
use crate::worker::Dispatcher;

/// Limits applied to each exchange with a persistent worker.
#[derive(Debug, Clone)]
pub struct SessionLimits {
    pub response_delimiter: Vec<u8>,
    pub max_response_bytes: usize,
    pub exchange_timeout: Duration,
    pub shutdown_grace: Duration,
    pub respawn_base_delay: Duration,
    pub respawn_max_delay: Duration,
}

impl SessionLimits {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            response_delimiter: config.worker.response_delimiter.as_bytes().to_vec(),
            max_response_bytes: config.worker.max_response_bytes,
            exchange_timeout: config.timeouts.worker(),
            shutdown_grace: config.timeouts.shutdown_grace(),
            respawn_base_delay: Duration::from_millis(config.worker.respawn_base_delay_ms),
            respawn_max_delay: Duration::from_millis(config.worker.respawn_max_delay_ms),
        }
    }
}

/// A running worker process and its framed pipes.
pub struct WorkerSession {
    child: Child,
    writer: FramedWrite<ChildStdin, EnvironmentEncoder>,
    reader: FramedRead<ChildStdout, ResponseDecoder>,
    exchanges: u64,
}

impl WorkerSession {
    /// Spawn the process and frame its stdin/stdout.
    pub fn start(command: &WorkerCommand, limits: &SessionLimits) -> Result<Self, WorkerError> {
        let mut child = command.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::BrokenChannel("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::BrokenChannel("stdout not captured".to_string()))?;

        metrics::record_worker_spawn(WorkerMode::Persistent);

        Ok(Self {
            child,
            writer: FramedWrite::new(stdin, EnvironmentEncoder),
            reader: FramedRead::new(
                stdout,
                ResponseDecoder::new(limits.response_delimiter.clone(), limits.max_response_bytes),
            ),
            exchanges: 0,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Whether the process is still running.
    pub fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::warn!(%status, exchanges = self.exchanges, "Worker process exited");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to poll worker status");
                false
            }
        }
    }

    /// Whether output arrived that no request asked for.
    ///
    /// Such bytes would otherwise be read as the next client's response.
    fn has_unclaimed_output(&mut self) -> bool {
        if !self.reader.read_buffer().is_empty() {
            return true;
        }
        // Pending means the pipe is quiet. Anything else is stray data or EOF.
        self.reader.next().now_or_never().is_some()
    }

    /// Alive and in step with the request/response protocol.
    pub fn is_usable(&mut self) -> bool {
        if !self.is_alive() {
            return false;
        }
        if self.has_unclaimed_output() {
            tracing::warn!(exchanges = self.exchanges, "Worker wrote output between requests");
            return false;
        }
        true
    }

    /// Write one request and read exactly one response.
    pub async fn exchange(&mut self, env: Environment) -> Result<Bytes, WorkerError> {
        self.writer.send(env).await.map_err(|e| match e {
            CodecError::Serialize(e) => WorkerError::Serialize(e),
            other => WorkerError::broken("write to worker failed", other),
        })?;

        let next = self.reader.next().await;
        match next {
            Some(Ok(_)) if !self.reader.read_buffer().is_empty() => Err(WorkerError::BrokenChannel(
                "worker wrote past the response delimiter".to_string(),
            )),
            Some(Ok(frame)) => {
                self.exchanges += 1;
                Ok(frame.freeze())
            }
            Some(Err(CodecError::TooLarge { limit })) => Err(WorkerError::ResponseTooLarge { limit }),
            Some(Err(e)) => Err(WorkerError::broken("read from worker failed", e)),
            None => Err(WorkerError::BrokenChannel(
                "worker closed its output".to_string(),
            )),
        }
    }

    /// Close stdin, give the process `grace` to exit, then kill it.
    pub async fn terminate(self, grace: Duration) {
        let WorkerSession {
            mut child,
            writer,
            reader,
            exchanges,
        } = self;
        drop(writer);
        drop(reader);

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(%status, exchanges, "Worker exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to wait for worker");
            }
            Err(_) => {
                tracing::warn!(grace = ?grace, "Worker did not exit in time, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill worker");
                }
            }
        }
    }
}

#[derive(Default)]
struct SessionSlot {
    session: Option<WorkerSession>,
    consecutive_spawn_failures: u32,
}

/// Supervisor for a single long-lived worker.
pub struct PersistentWorker {
    command: WorkerCommand,
    limits: SessionLimits,
    slot: Mutex<SessionSlot>,
}

impl PersistentWorker {
    pub fn new(command: WorkerCommand, limits: SessionLimits) -> Self {
        Self {
            command,
            limits,
            slot: Mutex::new(SessionSlot::default()),
        }
    }

    /// Spawn the worker ahead of the first request.
    pub async fn start(&self) -> Result<(), WorkerError> {
        let mut slot = self.slot.lock().await;
        self.ensure_session(&mut slot).await.map(|_| ())
    }

    /// Process id of the current worker, if one is running.
    pub async fn pid(&self) -> Option<u32> {
        let slot = self.slot.lock().await;
        slot.session.as_ref().and_then(WorkerSession::pid)
    }

    async fn ensure_session<'a>(
        &self,
        slot: &'a mut SessionSlot,
    ) -> Result<&'a mut WorkerSession, WorkerError> {
        let usable = match slot.session.as_mut() {
            Some(session) => session.is_usable(),
            None => false,
        };

        if !usable {
            if let Some(stale) = slot.session.take() {
                metrics::record_worker_failure("unusable");
                stale.terminate(Duration::ZERO).await;
            }

            if slot.consecutive_spawn_failures > 0 {
                let delay = calculate_backoff(
                    slot.consecutive_spawn_failures,
                    self.limits.respawn_base_delay,
                    self.limits.respawn_max_delay,
                );
                tracing::info!(
                    attempt = slot.consecutive_spawn_failures + 1,
                    delay = ?delay,
                    "Backing off before respawning worker"
                );
                tokio::time::sleep(delay).await;
            }

            match WorkerSession::start(&self.command, &self.limits) {
                Ok(session) => {
                    tracing::info!(pid = session.pid(), program = %self.command.program, "Worker started");
                    slot.consecutive_spawn_failures = 0;
                    slot.session = Some(session);
                }
                Err(e) => {
                    slot.consecutive_spawn_failures += 1;
                    return Err(e);
                }
            }
        }

        slot.session
            .as_mut()
            .ok_or_else(|| WorkerError::BrokenChannel("no worker session".to_string()))
    }
}

#[async_trait]
impl Dispatcher for PersistentWorker {
    async fn dispatch(&self, env: Environment) -> Result<Bytes, WorkerError> {
        let mut slot = self.slot.lock().await;
        let session = self.ensure_session(&mut slot).await?;

        let result = with_timeout(self.limits.exchange_timeout, session.exchange(env))
            .await
            .unwrap_or(Err(WorkerError::Timeout(self.limits.exchange_timeout)));

        // After an error the pipes may hold a partial frame. An empty frame
        // usually means the worker answered in more than one piece.
        let retire = match &result {
            Ok(reply) if reply.is_empty() => {
                tracing::warn!("Retiring worker session after an empty response");
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Retiring worker session after failed exchange");
                true
            }
        };
        if retire {
            if let Some(session) = slot.session.take() {
                session.terminate(Duration::ZERO).await;
            }
        }
        result
    }

    async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(session) = slot.session.take() {
            tracing::info!(pid = session.pid(), "Stopping worker");
            session.terminate(self.limits.shutdown_grace).await;
        }
    }

    fn mode(&self) -> WorkerMode {
        WorkerMode::Persistent
    }
}
