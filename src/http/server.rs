//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the axum router with the echo endpoint
//! - Wrap it in the request pipeline, composed once
//! - Serve on a bound listener until told to stop

use std::net::SocketAddr;

use axum::middleware;
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;

use crate::config::EchoConfig;
use crate::http::echo::{echo_handler, EchoState};
use crate::http::pipeline::{span_stage, Pipeline};
use crate::lifecycle::{RunningServer, Shutdown};
use crate::net::{InFlight, ListenerError};
use crate::telemetry::Tracer;

/// HTTP server for the echo service.
pub struct HttpServer {
    router: Router,
    in_flight: InFlight,
}

impl HttpServer {
    pub fn new(config: &EchoConfig, tracer: Tracer) -> Self {
        let in_flight = InFlight::new();
        let router = Self::build_router(EchoState::from_config(config), tracer, in_flight.clone());
        Self { router, in_flight }
    }

    fn build_router(state: EchoState, tracer: Tracer, in_flight: InFlight) -> Router {
        let echo = post(echo_handler).route_layer(middleware::from_fn_with_state(tracer, span_stage));
        let router = Router::new().route("/", echo).with_state(state);
        Pipeline::new(in_flight).apply(router)
    }

    /// The fully composed router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Start serving on `listener` in a background task.
    ///
    /// Triggering the returned server's stop signal closes the listener and
    /// lets in-flight requests finish.
    pub fn spawn(self, listener: TcpListener) -> RunningServer {
        let stop = Shutdown::new();
        let stopped = stop.signalled();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "HTTP server starting");
        }

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(stopped)
                .await
                .map_err(ListenerError::Serve)?;
            tracing::info!("HTTP server stopped");
            Ok::<(), ListenerError>(())
        });

        RunningServer::new(task, stop, self.in_flight)
    }
}
