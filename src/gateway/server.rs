//! The gateway loop.
//!
//! # Responsibilities
//! - Accept one connection at a time and run it to completion
//! - Parse, dispatch to the worker, relay, close
//! - Recover from every per-request failure and keep serving
//! - Stop accepting on shutdown, then release the listener and the worker
//!
//! # Design Decisions
//! - Sequential: the next `accept` happens only after the previous
//!   connection has been closed
//! - Stage changes are published on a watch channel so callers can observe
//!   progress without touching the loop

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{GatewayConfig, ResponseFormat};
use crate::gateway::error::GatewayError;
use crate::gateway::relay::{format_reply, relay};
use crate::http::{RequestParser, ServerIdentity};
use crate::lifecycle::Shutdown;
use crate::net::{Connection, ConnectionTracker, Listener, ReceiveError, SocketError};
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;
use crate::worker::{Dispatcher, WorkerError};

/// Pause after a failed `accept` before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStage {
    Idle,
    Accepting,
    Parsing,
    Dispatching,
    Relaying,
    Failed,
}

impl fmt::Display for GatewayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GatewayStage::Idle => "idle",
            GatewayStage::Accepting => "accepting",
            GatewayStage::Parsing => "parsing",
            GatewayStage::Dispatching => "dispatching",
            GatewayStage::Relaying => "relaying",
            GatewayStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-connection timing and formatting settings.
#[derive(Debug, Clone)]
struct RequestSettings {
    receive_timeout: Duration,
    send_timeout: Duration,
    response_format: ResponseFormat,
}

pub struct Gateway {
    listener: Listener,
    parser: RequestParser,
    dispatcher: Arc<dyn Dispatcher>,
    settings: RequestSettings,
    stage: watch::Sender<GatewayStage>,
}

impl Gateway {
    /// Assemble a gateway around a listening socket and a dispatcher.
    ///
    /// `SERVER_PORT` reports the port actually bound, which differs from the
    /// configured one when that is 0.
    pub fn new(
        listener: Listener,
        dispatcher: Arc<dyn Dispatcher>,
        config: &GatewayConfig,
    ) -> Result<Self, SocketError> {
        let port = listener.local_addr()?.port();
        let identity = ServerIdentity::new(config.server.name.clone(), port);
        let (stage, _) = watch::channel(GatewayStage::Idle);

        Ok(Self {
            listener,
            parser: RequestParser::new(identity),
            dispatcher,
            settings: RequestSettings {
                receive_timeout: config.timeouts.receive(),
                send_timeout: config.timeouts.send(),
                response_format: config.worker.response_format,
            },
            stage,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        self.listener.local_addr()
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.listener.tracker()
    }

    /// Observe stage transitions.
    pub fn stages(&self) -> watch::Receiver<GatewayStage> {
        self.stage.subscribe()
    }

    fn set_stage(&self, stage: GatewayStage) {
        self.stage.send_replace(stage);
        tracing::trace!(stage = %stage, "Gateway stage");
    }

    /// Serve until `shutdown` fires, then release the listener and worker.
    pub async fn run(mut self, shutdown: Shutdown) -> Result<(), GatewayError> {
        tracing::info!(
            address = %self.local_addr()?,
            mode = %self.dispatcher.mode(),
            "Gateway accepting connections"
        );

        loop {
            self.set_stage(GatewayStage::Accepting);

            let accepted = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok(conn) => {
                    let span = tracing::info_span!(
                        "request",
                        request_id = %Uuid::new_v4(),
                        connection_id = %conn.id(),
                        peer = %conn.peer_addr(),
                    );
                    self.handle(conn).instrument(span).await;
                }
                Err(e) => {
                    self.set_stage(GatewayStage::Failed);
                    tracing::warn!(error = %e, "Accept failed; retrying");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }

            self.set_stage(GatewayStage::Idle);
        }

        tracing::info!("Shutdown requested; no longer accepting");
        self.set_stage(GatewayStage::Idle);
        self.listener.close()?;
        self.dispatcher.shutdown().await;
        Ok(())
    }

    /// Run one connection to completion. Never fails; errors are answered
    /// where possible and logged.
    async fn handle(&self, mut conn: Connection) {
        let started = Instant::now();

        let outcome = match self.process(&mut conn).await {
            Ok(reply) => {
                self.set_stage(GatewayStage::Relaying);
                match relay(conn, &reply, self.settings.send_timeout).await {
                    Ok(()) => "ok",
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to relay response");
                        GatewayError::from(e).outcome()
                    }
                }
            }
            Err(e) => {
                self.set_stage(GatewayStage::Failed);
                self.fail(conn, &e).await;
                e.outcome()
            }
        };

        tracing::info!(outcome, elapsed = ?started.elapsed(), "Request finished");
        metrics::record_request(outcome, started);
    }

    /// Receive, parse, dispatch, and format. Returns the bytes to relay.
    async fn process(&self, conn: &mut Connection) -> Result<Bytes, GatewayError> {
        self.set_stage(GatewayStage::Parsing);
        let timeout = self.settings.receive_timeout;
        let raw = with_timeout(timeout, conn.receive())
            .await
            .unwrap_or(Err(ReceiveError::TimedOut(timeout)))?;

        let env = self.parser.parse(&raw)?;
        tracing::debug!(
            method = %env.request_method,
            path = %env.path_info,
            query = %env.query_string,
            "Request parsed"
        );

        self.set_stage(GatewayStage::Dispatching);
        let output = match self.dispatcher.dispatch(env).await {
            Ok(output) => output,
            Err(WorkerError::Failure { status, output }) if !output.is_empty() => {
                metrics::record_worker_failure("failure");
                tracing::warn!(%status, bytes = output.len(), "Worker failed; relaying its partial output");
                output
            }
            Err(e) => {
                metrics::record_worker_failure(e.kind());
                return Err(e.into());
            }
        };

        if output.is_empty() {
            return Err(GatewayError::EmptyReply);
        }
        Ok(format_reply(self.settings.response_format, output)?)
    }

    /// Best-effort error response, then close.
    async fn fail(&self, conn: Connection, err: &GatewayError) {
        match err.response() {
            Some(response) => {
                tracing::warn!(error = %err, status = response.status(), "Request failed");
                if let Err(e) = relay(conn, &response.to_bytes(), self.settings.send_timeout).await {
                    tracing::debug!(error = %e, "Could not deliver error response");
                }
            }
            None => {
                tracing::debug!(error = %err, "Closing connection without a response");
                conn.close().await;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::WorkerMode;
    use crate::worker::build_dispatcher;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn gateway(program: &str, args: &[&str], mode: WorkerMode) -> Gateway {
        let mut config = GatewayConfig::default();
        config.listener.port = 0;
        config.worker.program = program.to_string();
        config.worker.args = args.iter().map(|s| s.to_string()).collect();
        config.worker.mode = mode;

        let listener = Listener::open(&config.listener).unwrap();
        let dispatcher = build_dispatcher(&config).await.unwrap();
        Gateway::new(listener, dispatcher, &config).unwrap()
    }

    async fn roundtrip(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn stages_return_to_accepting_after_request() {
        let gateway = gateway("cat", &[], WorkerMode::PerRequest).await;
        let addr = gateway.local_addr().unwrap();
        let mut stages = gateway.stages();
        let shutdown = Shutdown::new();
        let server = tokio::spawn(gateway.run(shutdown.clone()));

        let reply = roundtrip(addr, b"GET /x HTTP/1.1\r\n\r\n").await;
        assert!(!reply.is_empty());

        let seen = stages
            .wait_for(|s| *s == GatewayStage::Accepting)
            .await
            .map(|s| *s)
            .unwrap();
        assert_eq!(seen, GatewayStage::Accepting);

        shutdown.trigger();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_listener() {
        let gateway = gateway("cat", &[], WorkerMode::Persistent).await;
        let addr = gateway.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let server = tokio::spawn(gateway.run(shutdown.clone()));

        shutdown.trigger();
        server.await.unwrap().unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn malformed_request_gets_400_and_loop_continues() {
        let gateway = gateway("cat", &[], WorkerMode::PerRequest).await;
        let addr = gateway.local_addr().unwrap();
        let tracker = gateway.tracker();
        let shutdown = Shutdown::new();
        let server = tokio::spawn(gateway.run(shutdown.clone()));

        let reply = roundtrip(addr, b"GARBAGE\r\n\r\n").await;
        assert!(reply.starts_with(b"HTTP/1.1 400 \r\n"));

        let reply = roundtrip(addr, b"GET /ok HTTP/1.1\r\n\r\n").await;
        let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(value["PATH_INFO"], "/ok");

        shutdown.trigger();
        server.await.unwrap().unwrap();
        assert_eq!(tracker.active_count(), 0);
    }
}
