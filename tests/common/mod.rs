//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use echo_trace::config::{EchoConfig, SinkConfig};
use echo_trace::lifecycle::{Phase, ShutdownCoordinator, ShutdownReport};
use echo_trace::net::{self, InFlight};
use echo_trace::{telemetry, HttpServer, Tracer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Defaults suitable for tests: ephemeral port, no sink, short timeouts.
pub fn test_config() -> EchoConfig {
    let mut config = EchoConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.telemetry.sink = SinkConfig::None;
    config.telemetry.batch_interval_ms = 50;
    config.shutdown.grace_period_secs = 5;
    config.shutdown.flush_timeout_secs = 2;
    config
}

/// A server running under a shutdown coordinator.
pub struct TestServer {
    pub addr: SocketAddr,
    pub tracer: Tracer,
    pub in_flight: InFlight,
    pub phase: watch::Receiver<Phase>,
    interrupt: Option<oneshot::Sender<()>>,
    coordinator: JoinHandle<ShutdownReport>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Deliver the interrupt without waiting for shutdown.
    pub fn interrupt(&mut self) {
        if let Some(tx) = self.interrupt.take() {
            let _ = tx.send(());
        }
    }

    /// Interrupt and wait for the coordinator to finish.
    pub async fn shutdown(mut self) -> ShutdownReport {
        self.interrupt();
        tokio::time::timeout(Duration::from_secs(10), self.coordinator)
            .await
            .expect("shutdown timed out")
            .expect("coordinator panicked")
    }
}

pub async fn start_server(config: EchoConfig) -> TestServer {
    let tracer = telemetry::install(&config).expect("telemetry");
    let listener = net::bind(&config.listener).await.expect("bind");
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(&config, tracer.clone()).spawn(listener);
    let in_flight = server.in_flight().clone();

    let coordinator = ShutdownCoordinator::new(&config.shutdown);
    let phase = coordinator.phase();
    let (tx, rx) = oneshot::channel::<()>();
    let coordinator = tokio::spawn({
        let tracer = tracer.clone();
        async move {
            let interrupt = async move {
                let _ = rx.await;
            };
            coordinator.run(server, &tracer, interrupt).await
        }
    });

    TestServer {
        addr,
        tracer,
        in_flight,
        phase,
        interrupt: Some(tx),
        coordinator,
    }
}

/// Write `request` on a fresh connection and read until the server closes it.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    stream.shutdown().await.unwrap();
    read_to_close(&mut stream).await
}

pub async fn read_to_close(stream: &mut TcpStream) -> String {
    let mut response = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response)).await;
    String::from_utf8_lossy(&response).into_owned()
}

/// Poll `condition` every 10ms for up to two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
