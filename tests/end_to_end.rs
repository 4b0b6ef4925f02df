//! End-to-end tests: raw TCP client → gateway → real worker process.

#![cfg(unix)]

use std::time::Duration;

use worker_gateway::config::{ResponseFormat, WorkerMode};
use worker_gateway::http::{RequestParser, ServerIdentity};

mod common;

const HELLO: &[u8] =
    b"GET /hello?x=1 HTTP/1.1\r\nHost: h\r\nContent-Type: text/plain\r\nContent-Length: 0\r\n\r\n";

fn expected_record(port: u16, request: &[u8]) -> Vec<u8> {
    RequestParser::new(ServerIdentity::new("test-gateway", port))
        .parse(request)
        .unwrap()
        .to_wire()
        .unwrap()
}

#[tokio::test]
async fn test_per_request_echo_relays_exact_record() {
    let gw = common::start_gateway(common::config("cat", &[], WorkerMode::PerRequest)).await;

    let reply = common::send_raw(gw.addr, HELLO).await;
    assert_eq!(reply, expected_record(gw.addr.port(), HELLO));

    let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(value["REQUEST_METHOD"], "GET");
    assert_eq!(value["PATH_INFO"], "/hello");
    assert_eq!(value["QUERY_STRING"], "x=1");
    assert_eq!(value["CONTENT_TYPE"], "text/plain");
    assert_eq!(value["CONTENT_LENGTH"], "0");
    assert_eq!(value["SERVER_PROTOCOL"], "HTTP/1.1");
    assert_eq!(value["SERVER_NAME"], "test-gateway");
    assert_eq!(value["SERVER_PORT"], gw.addr.port().to_string());
    assert_eq!(value.as_object().unwrap().len(), 16);

    common::wait_for_idle(&gw.tracker).await;
    gw.stop().await;
}

#[tokio::test]
async fn test_persistent_echo_strips_delimiter() {
    let gw = common::start_gateway(common::config("cat", &[], WorkerMode::Persistent)).await;

    for _ in 0..3 {
        let reply = common::send_raw(gw.addr, HELLO).await;
        let mut expected = expected_record(gw.addr.port(), HELLO);
        expected.pop();
        assert_eq!(reply, expected);
    }

    gw.stop().await;
}

#[tokio::test]
async fn test_worker_exiting_silently_yields_502_and_clean_close() {
    for mode in [WorkerMode::PerRequest, WorkerMode::Persistent] {
        let gw = common::start_gateway(common::config("true", &[], mode)).await;

        let reply = common::send_raw(gw.addr, HELLO).await;
        assert_eq!(common::status_of(&reply), Some(502), "mode {mode}");

        // Still serving afterwards.
        let reply = common::send_raw(gw.addr, HELLO).await;
        assert_eq!(common::status_of(&reply), Some(502), "mode {mode}");

        common::wait_for_idle(&gw.tracker).await;
        gw.stop().await;
    }
}

#[tokio::test]
async fn test_malformed_request_gets_400() {
    let gw = common::start_gateway(common::config("cat", &[], WorkerMode::PerRequest)).await;

    let reply = common::send_raw(gw.addr, b"GET\r\n\r\n").await;
    assert_eq!(common::status_of(&reply), Some(400));
    let text = String::from_utf8(reply).unwrap();
    assert!(text.contains("Connection: close\r\n"));

    gw.stop().await;
}

#[tokio::test]
async fn test_hung_worker_gets_504() {
    let mut config = common::config("sleep", &["30"], WorkerMode::PerRequest);
    config.timeouts.worker_ms = 300;
    let gw = common::start_gateway(config).await;

    let started = std::time::Instant::now();
    let reply = common::send_raw(gw.addr, HELLO).await;
    assert_eq!(common::status_of(&reply), Some(504));
    assert!(started.elapsed() < Duration::from_secs(5));

    gw.stop().await;
}

#[tokio::test]
async fn test_silent_client_gets_408() {
    let mut config = common::config("cat", &[], WorkerMode::PerRequest);
    config.timeouts.receive_ms = 200;
    let gw = common::start_gateway(config).await;

    // Partial request with no header terminator.
    let reply = common::send_raw(gw.addr, b"GET / HTTP/1.1\r\n").await;
    assert_eq!(common::status_of(&reply), Some(408));

    gw.stop().await;
}

#[tokio::test]
async fn test_persistent_worker_respawns_after_exit() {
    let gw = common::start_gateway(common::config("head", &["-n", "1"], WorkerMode::Persistent)).await;

    for path in ["/one", "/two", "/three"] {
        let request = format!("GET {path} HTTP/1.1\r\n\r\n");
        let reply = common::send_raw(gw.addr, request.as_bytes()).await;
        let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(value["PATH_INFO"], path);

        // `head` exits after one line; give it time to go.
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    gw.stop().await;
}

#[tokio::test]
async fn test_concurrent_clients_get_their_own_responses() {
    let gw = common::start_gateway(common::config("cat", &[], WorkerMode::Persistent)).await;
    let addr = gw.addr;

    let clients: Vec<_> = (0..10)
        .map(|i| {
            tokio::spawn(async move {
                let path = format!("/client/{i}");
                let request = format!("GET {path} HTTP/1.1\r\n\r\n");
                let reply = common::send_raw(addr, request.as_bytes()).await;
                let value: serde_json::Value = serde_json::from_slice(&reply).unwrap();
                assert_eq!(value["PATH_INFO"], path.as_str());
            })
        })
        .collect();

    for client in clients {
        client.await.unwrap();
    }

    common::wait_for_idle(&gw.tracker).await;
    gw.stop().await;
}

#[tokio::test]
async fn test_connections_released_across_mixed_outcomes() {
    let gw = common::start_gateway(common::config("cat", &[], WorkerMode::PerRequest)).await;

    let requests: [&[u8]; 4] = [HELLO, b"BROKEN\r\n\r\n", b"", HELLO];
    for request in requests {
        let _ = common::send_raw(gw.addr, request).await;
        common::wait_for_idle(&gw.tracker).await;
    }

    assert_eq!(gw.tracker.active_count(), 0);
    gw.stop().await;
}

#[tokio::test]
async fn test_wrap_format_adds_status_line() {
    let mut config = common::config("sh", &["-c", "cat >/dev/null; printf hello"], WorkerMode::PerRequest);
    config.worker.response_format = ResponseFormat::Wrap;
    let gw = common::start_gateway(config).await;

    let reply = common::send_raw(gw.addr, HELLO).await;
    let text = String::from_utf8(reply).unwrap();
    assert_eq!(common::status_of(text.as_bytes()), Some(200));
    assert!(text.contains("Content-Length: 5\r\n"));
    assert!(text.ends_with("\r\n\r\nhello"));

    gw.stop().await;
}

#[tokio::test]
async fn test_cgi_format_maps_worker_status() {
    let script = "cat >/dev/null; printf 'Status: 201 Created\\r\\nX-Worker: yes\\r\\n\\r\\nmade'";
    let mut config = common::config("sh", &["-c", script], WorkerMode::PerRequest);
    config.worker.response_format = ResponseFormat::Cgi;
    let gw = common::start_gateway(config).await;

    let reply = common::send_raw(gw.addr, HELLO).await;
    let text = String::from_utf8(reply).unwrap();
    assert_eq!(common::status_of(text.as_bytes()), Some(201));
    assert!(text.contains("X-Worker: yes\r\n"));
    assert!(text.ends_with("made"));

    gw.stop().await;
}

#[tokio::test]
async fn test_persistent_multi_line_replies_stay_with_their_request() {
    let script = "while read l; do printf 'Status: 200 OK\\nContent-Type: text/plain\\n\\nbody\\n'; done";
    let gw = common::start_gateway(common::config("sh", &["-c", script], WorkerMode::Persistent)).await;

    for _ in 0..3 {
        let reply = common::send_raw(gw.addr, HELLO).await;
        assert!(
            reply == b"Status: 200 OK" || common::status_of(&reply) == Some(502),
            "unexpected reply {:?}",
            String::from_utf8_lossy(&reply)
        );
    }

    gw.stop().await;
}

#[tokio::test]
async fn test_persistent_cgi_worker_with_block_delimiter() {
    let script = "while read l; do \
        printf 'Status: 201 Created\\r\\nX-Worker: yes\\r\\n\\r\\nmade\\n--end--\\n'; done";
    let mut config = common::config("sh", &["-c", script], WorkerMode::Persistent);
    config.worker.response_format = ResponseFormat::Cgi;
    config.worker.response_delimiter = "\n--end--\n".into();
    let gw = common::start_gateway(config).await;

    for _ in 0..3 {
        let reply = common::send_raw(gw.addr, HELLO).await;
        let text = String::from_utf8(reply).unwrap();
        assert_eq!(common::status_of(text.as_bytes()), Some(201));
        assert!(text.contains("X-Worker: yes\r\n"));
        assert!(text.ends_with("\r\n\r\nmade"));
    }

    gw.stop().await;
}
