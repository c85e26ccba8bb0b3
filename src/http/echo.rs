//! The echo endpoint.

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::config::{BodyErrorMode, EchoConfig};
use crate::telemetry::{ActiveSpan, SpanStatus};

/// Handler configuration, fixed at startup.
#[derive(Debug, Clone)]
pub struct EchoState {
    pub body_limit: usize,
    pub trace_payload: bool,
    pub body_error_mode: BodyErrorMode,
}

impl EchoState {
    pub fn from_config(config: &EchoConfig) -> Self {
        Self {
            body_limit: config.listener.body_limit(),
            trace_payload: config.telemetry.trace_payload,
            body_error_mode: config.telemetry.body_error_mode,
        }
    }
}

impl Default for EchoState {
    fn default() -> Self {
        Self::from_config(&EchoConfig::default())
    }
}

#[derive(Debug, Error)]
pub enum EchoError {
    #[error("failed to read request body: {0}")]
    Body(#[source] axum::Error),
}

impl IntoResponse for EchoError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

/// Echo the request body back with the request's content type.
///
/// The body is read completely before anything is written, so a failed read
/// never produces a partial echo.
pub async fn echo_handler(
    State(state): State<EchoState>,
    request: Request,
) -> Result<Response, EchoError> {
    let span = request.extensions().get::<ActiveSpan>().cloned();
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

    let body = match axum::body::to_bytes(request.into_body(), state.body_limit).await {
        Ok(body) => body,
        Err(source) => {
            let error = EchoError::Body(source);
            tracing::warn!(error = %error, "Request body read failed");
            return match state.body_error_mode {
                BodyErrorMode::Annotate => Ok(annotate(span.as_ref(), &error)),
                BodyErrorMode::Propagate => Err(error),
            };
        }
    };

    if state.trace_payload {
        if let Some(span) = &span {
            span.set_attribute("request.message", String::from_utf8_lossy(&body).into_owned());
        }
    }

    Ok(echo(body, content_type))
}

fn echo(body: Bytes, content_type: HeaderValue) -> Response {
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    response
}

fn annotate(span: Option<&ActiveSpan>, error: &EchoError) -> Response {
    let message = error.to_string();
    if let Some(span) = span {
        span.record_error(error);
        span.set_status(SpanStatus::error(message.clone()));
    }
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}
