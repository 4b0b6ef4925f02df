//! Descriptor accounting across success and failure cycles.
//!
//! Kept in its own test binary: the count covers the whole process, so no
//! other test may open sockets or pipes concurrently.

#![cfg(target_os = "linux")]

use std::time::Duration;

use worker_gateway::config::WorkerMode;

mod common;

/// Echoes, exits silently on `/fail`, and stalls on `/slow`.
const WORKER: &str = "while read line; do case \"$line\" in \
    *'\"PATH_INFO\":\"/fail\"'*) exit 0;; \
    *'\"PATH_INFO\":\"/slow\"'*) sleep 5;; \
    *) echo \"$line\";; esac; done";

fn open_descriptors() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}

/// Current count once it drops back to `expected`, or after two seconds.
///
/// Killed children are reaped asynchronously, so their handles may linger briefly.
async fn settled_count(expected: usize) -> usize {
    let mut count = open_descriptors();
    for _ in 0..20 {
        if count <= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        count = open_descriptors();
    }
    count
}

#[tokio::test]
async fn test_no_descriptor_leak_across_outcomes() {
    for mode in [WorkerMode::PerRequest, WorkerMode::Persistent] {
        let mut config = common::config("sh", &["-c", WORKER], mode);
        config.timeouts.worker_ms = 300;
        let gw = common::start_gateway(config).await;

        // Warm-up: first spawn sets up runtime-wide process plumbing.
        let reply = common::send_raw(gw.addr, b"GET /ok HTTP/1.1\r\n\r\n").await;
        assert!(reply.starts_with(b"{"), "mode {mode}");
        common::wait_for_idle(&gw.tracker).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let baseline = open_descriptors();

        for _ in 0..3 {
            let reply = common::send_raw(gw.addr, b"GET /ok HTTP/1.1\r\n\r\n").await;
            assert!(reply.starts_with(b"{"), "mode {mode}");

            let reply = common::send_raw(gw.addr, b"BROKEN\r\n\r\n").await;
            assert_eq!(common::status_of(&reply), Some(400), "mode {mode}");

            let reply = common::send_raw(gw.addr, b"GET /fail HTTP/1.1\r\n\r\n").await;
            assert_eq!(common::status_of(&reply), Some(502), "mode {mode}");

            let reply = common::send_raw(gw.addr, b"GET /slow HTTP/1.1\r\n\r\n").await;
            assert_eq!(common::status_of(&reply), Some(504), "mode {mode}");
        }

        // Leaves a live persistent session, as at the baseline.
        let reply = common::send_raw(gw.addr, b"GET /ok HTTP/1.1\r\n\r\n").await;
        assert!(reply.starts_with(b"{"), "mode {mode}");
        common::wait_for_idle(&gw.tracker).await;

        assert_eq!(settled_count(baseline).await, baseline, "mode {mode}");
        gw.stop().await;
    }
}
