//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use worker_gateway::config::{GatewayConfig, WorkerMode};
use worker_gateway::net::ConnectionTracker;
use worker_gateway::{lifecycle, GatewayError, Shutdown};

/// A gateway running on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub tracker: ConnectionTracker,
    pub shutdown: Shutdown,
    handle: JoinHandle<Result<(), GatewayError>>,
}

impl TestGateway {
    /// Trigger shutdown and wait for the loop to exit.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("gateway did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Config for `program args...` on 127.0.0.1:0.
pub fn config(program: &str, args: &[&str], mode: WorkerMode) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.port = 0;
    config.server.name = "test-gateway".into();
    config.worker.program = program.into();
    config.worker.args = args.iter().map(|a| a.to_string()).collect();
    config.worker.mode = mode;
    config.timeouts.receive_ms = 2_000;
    config.timeouts.worker_ms = 5_000;
    config.timeouts.shutdown_grace_ms = 500;
    config
}

/// Start a gateway and serve in the background.
pub async fn start_gateway(config: GatewayConfig) -> TestGateway {
    let gateway = lifecycle::start(&config).await.unwrap();
    let addr = gateway.local_addr().unwrap();
    let tracker = gateway.tracker();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(gateway.run(shutdown.clone()));

    TestGateway {
        addr,
        tracker,
        shutdown,
        handle,
    }
}

/// Write `request` and read until the gateway closes the connection.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut out))
        .await
        .expect("gateway never closed the connection")
        .unwrap();
    out
}

/// Status code from a gateway-generated `HTTP/1.1 <code> ` line.
pub fn status_of(response: &[u8]) -> Option<u16> {
    let text = std::str::from_utf8(response).ok()?;
    text.strip_prefix("HTTP/1.1 ")?.split(' ').next()?.parse().ok()
}

/// Wait until the tracker reports no live connections.
pub async fn wait_for_idle(tracker: &ConnectionTracker) {
    for _ in 0..100 {
        if tracker.active_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} connection(s) still open", tracker.active_count());
}
