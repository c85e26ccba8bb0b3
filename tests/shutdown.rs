//! Graceful drain and span flushing on interrupt.

use std::time::Duration;

use echo_trace::config::SinkConfig;
use echo_trace::lifecycle::{Phase, ShutdownCause};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

mod common;

#[tokio::test]
async fn drain_finishes_in_flight_and_refuses_new_connections() {
    let mut server = common::start_server(common::test_config()).await;
    let addr = server.addr;

    // Headers and half of the body, so the request stays in flight.
    let mut slow = TcpStream::connect(addr).await.unwrap();
    slow.write_all(b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 10\r\n\r\nhello")
        .await
        .unwrap();
    let in_flight = server.in_flight.clone();
    assert!(common::eventually(|| in_flight.active() == 1).await);

    server.interrupt();
    let mut phase = server.phase.clone();
    tokio::time::timeout(Duration::from_secs(2), phase.wait_for(|p| *p == Phase::Draining))
        .await
        .unwrap()
        .unwrap();

    let mut refused = false;
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(refused, "listener still accepting after interrupt");

    slow.write_all(b"world").await.unwrap();
    let response = common::read_to_close(&mut slow).await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("helloworld"), "{response}");

    let report = server.shutdown().await;
    assert_eq!(report.cause, ShutdownCause::Interrupt);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.abandoned, 0);
}

#[tokio::test]
async fn grace_period_abandons_stuck_requests() {
    let mut config = common::test_config();
    config.shutdown.grace_period_secs = 1;
    let mut server = common::start_server(config).await;

    let mut stuck = TcpStream::connect(server.addr).await.unwrap();
    stuck
        .write_all(b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 10\r\n\r\nhel")
        .await
        .unwrap();
    let in_flight = server.in_flight.clone();
    assert!(common::eventually(|| in_flight.active() == 1).await);

    server.interrupt();
    let report = server.shutdown().await;
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.abandoned, 1);
}

#[tokio::test]
async fn spans_reach_file_sink_before_exit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spans.json");
    let mut config = common::test_config();
    config.telemetry.sink = SinkConfig::File {
        path: path.to_string_lossy().into_owned(),
    };
    config.telemetry.batch_interval_ms = 60_000;
    let server = common::start_server(config).await;

    let client = reqwest::Client::new();
    for i in 0..3 {
        let response = client
            .post(server.url())
            .body(format!("message-{i}"))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
    }

    let report = server.shutdown().await;
    assert_eq!(report.flush.exported, 3);
    assert!(report.flush.is_complete());

    let content = std::fs::read_to_string(&path).unwrap();
    let spans: Vec<serde_json::Value> = serde_json::Deserializer::from_str(&content)
        .into_iter::<serde_json::Value>()
        .map(|batch| batch.unwrap())
        .flat_map(|batch| batch["spans"].as_array().cloned().unwrap_or_default())
        .collect();
    assert_eq!(spans.len(), 3);
    let messages: Vec<&str> = spans
        .iter()
        .map(|s| s["attributes"]["request.message"].as_str().unwrap())
        .collect();
    assert_eq!(messages, ["message-0", "message-1", "message-2"]);
    assert!(spans.iter().all(|s| s["attributes"]["http.status_code"] == 200));
}

#[tokio::test]
async fn empty_flush_reports_nothing_unsent() {
    let server = common::start_server(common::test_config()).await;

    let report = server
        .tracer
        .flush(tokio::time::Instant::now() + Duration::from_secs(1))
        .await;
    assert_eq!(report.exported, 0);
    assert!(report.unsent.is_empty());

    server.shutdown().await;
}
