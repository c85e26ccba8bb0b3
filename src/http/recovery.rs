//! Panic recovery for the request pipeline.
//!
//! A panic anywhere inside the guarded stages becomes a [`Fault`], which is
//! logged with an incident id and answered with a uniform 500. The
//! connection and the process keep running.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use thiserror::Error;
use uuid::Uuid;

/// Response header carrying the incident id of a recovered fault.
pub const X_INCIDENT_ID: &str = "x-incident-id";

/// A runtime fault caught at the recovery boundary.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("handler panicked: {message}")]
    Panic { incident: Uuid, message: String },
}

impl Fault {
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else {
            "non-string panic payload".to_string()
        };
        Fault::Panic {
            incident: Uuid::new_v4(),
            message,
        }
    }

    pub fn incident(&self) -> Uuid {
        match self {
            Fault::Panic { incident, .. } => *incident,
        }
    }
}

impl IntoResponse for Fault {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
        if let Ok(value) = HeaderValue::from_str(&self.incident().to_string()) {
            response.headers_mut().insert(X_INCIDENT_ID, value);
        }
        response
    }
}

/// Middleware catching panics from every inner stage.
pub async fn recover(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let fault = Fault::from_panic(payload);
            tracing::error!(
                incident = %fault.incident(),
                method = %method,
                path = %path,
                error = %fault,
                "Recovered from handler panic"
            );
            fault.into_response()
        }
    }
}
