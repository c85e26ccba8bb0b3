//! Request pipeline stages.
//!
//! # Stage Order
//! ```text
//! SetRequestId → PropagateRequestId → in-flight → access log (TraceLayer)
//!     → recovery → [router] → span stage (POST / only) → echo handler
//! ```
//!
//! Everything above the router wraps every request, including 404 and 405
//! answers. The span stage is a route layer on the echo endpoint, so only
//! requests that reach the handler get a span.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::{HeaderName, Response};
use axum::middleware::{self, Next};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::http::recovery::recover;
use crate::net::InFlight;
use crate::observability::metrics;
use crate::telemetry::{context, ActiveSpan, SpanKind, SpanStatus, Tracer};

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// The fixed set of stages wrapped around the router.
#[derive(Debug, Clone)]
pub struct Pipeline {
    in_flight: InFlight,
}

impl Pipeline {
    pub fn new(in_flight: InFlight) -> Self {
        Self { in_flight }
    }

    /// Wrap `router` in the outer stages.
    pub fn apply(self, router: Router) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(middleware::from_fn_with_state(self.in_flight, in_flight_stage))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(access_span)
                        .on_response(access_log),
                )
                .layer(middleware::from_fn(recover)),
        )
    }
}

/// Counts the request as in flight and records request metrics.
async fn in_flight_stage(State(in_flight): State<InFlight>, req: Request, next: Next) -> Response<Body> {
    let _guard = in_flight.track();
    let method = req.method().clone();
    let start = Instant::now();

    let response = next.run(req).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

fn access_span(req: &Request) -> tracing::Span {
    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        request_id = %request_id,
    )
}

fn access_log(response: &Response<Body>, latency: Duration, _span: &tracing::Span) {
    tracing::info!(
        status = response.status().as_u16(),
        latency_ms = latency.as_secs_f64() * 1000.0,
        "Request completed"
    );
}

/// Opens the request span, hands it to the handler and seals it afterwards.
///
/// A panic below this stage drops the span, which seals it with an error
/// status; the recovery stage then answers the request.
pub async fn span_stage(State(tracer): State<Tracer>, mut req: Request, next: Next) -> Response<Body> {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let parent = context::extract(req.headers());

    let span = ActiveSpan::new(tracer.start_span_with_parent(route.clone(), SpanKind::Server, parent));
    span.set_attribute("http.method", req.method().as_str());
    span.set_attribute("http.route", route.as_str());
    span.set_attribute(
        "http.target",
        req.uri()
            .path_and_query()
            .map_or_else(|| req.uri().path().to_owned(), |pq| pq.as_str().to_owned()),
    );
    if let Some(id) = req.headers().get(X_REQUEST_ID).and_then(|v| v.to_str().ok()) {
        span.set_attribute("http.request_id", id);
    }
    if let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        span.set_attribute("net.peer.addr", peer.to_string());
    }

    req.extensions_mut().insert(span.clone());
    let response = next.run(req).await;

    let status = response.status();
    span.set_attribute("http.status_code", i64::from(status.as_u16()));
    if status.is_server_error() && span.status() == Some(SpanStatus::Unset) {
        span.set_status(SpanStatus::error(format!("HTTP status {}", status.as_u16())));
    }
    span.end();

    response
}
