//! Failure injection tests: misbehaving workers must never take the gateway down.

#![cfg(unix)]

use std::time::Duration;

use worker_gateway::config::WorkerMode;

mod common;

const REQUEST: &[u8] = b"GET /fail HTTP/1.1\r\nHost: test\r\n\r\n";

#[tokio::test]
async fn test_partial_output_relayed_on_nonzero_exit() {
    let config = common::config(
        "sh",
        &["-c", "cat >/dev/null; printf 'half a reply'; exit 7"],
        WorkerMode::PerRequest,
    );
    let gw = common::start_gateway(config).await;

    let reply = common::send_raw(gw.addr, REQUEST).await;
    assert_eq!(reply, b"half a reply");

    gw.stop().await;
}

#[tokio::test]
async fn test_nonzero_exit_without_output_is_502() {
    let config = common::config("sh", &["-c", "exit 3"], WorkerMode::PerRequest);
    let gw = common::start_gateway(config).await;

    let reply = common::send_raw(gw.addr, REQUEST).await;
    assert_eq!(common::status_of(&reply), Some(502));

    gw.stop().await;
}

#[tokio::test]
async fn test_crash_looping_persistent_worker() {
    // Reads one line, answers, then dies mid-way through the next exchange.
    let script = "read line; echo \"$line\"; read line; exit 1";
    let mut config = common::config("sh", &["-c", script], WorkerMode::Persistent);
    config.worker.respawn_base_delay_ms = 10;
    config.worker.respawn_max_delay_ms = 50;
    let gw = common::start_gateway(config).await;

    let mut ok = 0;
    let mut failed = 0;
    for _ in 0..6 {
        let reply = common::send_raw(gw.addr, REQUEST).await;
        match common::status_of(&reply) {
            Some(502) => failed += 1,
            _ => {
                let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
                assert_eq!(value["PATH_INFO"], "/fail");
                ok += 1;
            }
        }
    }
    assert!(ok >= 3, "ok={ok} failed={failed}");
    assert!(failed >= 1, "ok={ok} failed={failed}");

    common::wait_for_idle(&gw.tracker).await;
    gw.stop().await;
}

#[tokio::test]
async fn test_oversized_worker_output_is_502() {
    let mut config = common::config(
        "sh",
        &["-c", "cat >/dev/null; head -c 100000 /dev/zero"],
        WorkerMode::PerRequest,
    );
    config.worker.max_response_bytes = 1024;
    let gw = common::start_gateway(config).await;

    let reply = common::send_raw(gw.addr, REQUEST).await;
    assert_eq!(common::status_of(&reply), Some(502));

    gw.stop().await;
}

#[tokio::test]
async fn test_persistent_worker_timeout_then_recovery() {
    // First exchange hangs; the replacement process echoes normally.
    let marker = tempfile::NamedTempFile::new().unwrap();
    let path = marker.path().to_string_lossy().into_owned();
    let script = format!(
        "if [ -s {path} ]; then exec cat; else echo started > {path}; exec sleep 30; fi"
    );
    let mut config = common::config("sh", &["-c", &script], WorkerMode::Persistent);
    config.timeouts.worker_ms = 300;
    let gw = common::start_gateway(config).await;

    let reply = common::send_raw(gw.addr, REQUEST).await;
    assert_eq!(common::status_of(&reply), Some(504));

    let reply = common::send_raw(gw.addr, REQUEST).await;
    let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(value["PATH_INFO"], "/fail");

    gw.stop().await;
}

#[tokio::test]
async fn test_client_disconnecting_early_does_not_stall_loop() {
    let mut config = common::config("sh", &["-c", "sleep 0.2; cat"], WorkerMode::PerRequest);
    config.timeouts.worker_ms = 2_000;
    let gw = common::start_gateway(config).await;

    {
        use tokio::io::AsyncWriteExt;
        let mut stream = tokio::net::TcpStream::connect(gw.addr).await.unwrap();
        stream.write_all(REQUEST).await.unwrap();
        // Dropped before the worker answers.
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    let reply = common::send_raw(gw.addr, REQUEST).await;
    let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(value["PATH_INFO"], "/fail");

    common::wait_for_idle(&gw.tracker).await;
    gw.stop().await;
}
