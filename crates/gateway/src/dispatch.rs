//! Operation dispatcher.
//!
//! Routes a classified request to the session manager and maps the outcome
//! onto the HTTP response contract:
//!
//! - pre-flight (`OPTIONS`) → 204, no body
//! - malformed payload → 400
//! - session created → 201 `{containerId}`
//! - code executed → 201 with the captured output
//! - kill → 200, always
//! - any failure to create a session or run code → 500 with a reason
//!
//! Every method other than `OPTIONS` goes through the classifier; the error
//! body's `code` tells failures apart.

use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

use replbox_core::{ContainerId, Error, Result};
use replbox_sandbox::SessionManager;

use crate::classifier::{classify_request, Operation};

/// Session creation response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub container_id: ContainerId,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Trace ID.
    pub trace_id: Option<String>,
}

/// HTTP status for a failed operation.
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::MalformedRequest(_) | Error::Serialization(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &Error, trace_id: &str) -> Response {
    (
        status_for(error),
        Json(ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
            trace_id: Some(trace_id.to_string()),
        }),
    )
        .into_response()
}

/// Decode the body and classify it against `method`.
pub fn decode(method: &Method, body: &[u8]) -> Result<Operation> {
    let payload: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| Error::malformed(format!("body is not valid JSON: {}", e)))?;
    classify_request(method, &payload)
}

/// Handle one request against the operations endpoint.
pub async fn dispatch(manager: &SessionManager, method: &Method, body: &[u8]) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    let started = Instant::now();

    let response = if method == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        match decode(method, body) {
            Ok(op) => {
                tracing::info!(trace_id = %trace_id, method = %method, operation = op.name(), "Dispatching operation");
                run(manager, op, &trace_id).await
            }
            Err(e) => {
                tracing::warn!(trace_id = %trace_id, method = %method, error = %e, "Rejected request");
                error_response(&e, &trace_id)
            }
        }
    };

    replbox_telemetry::track_request(
        method.as_str(),
        "/",
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn run(manager: &SessionManager, op: Operation, trace_id: &str) -> Response {
    match op {
        Operation::CreateSession { language } => match manager.create_session(&language).await {
            Ok(container_id) => (
                StatusCode::CREATED,
                Json(CreateSessionResponse { container_id }),
            )
                .into_response(),
            Err(e) => {
                tracing::error!(trace_id = %trace_id, language = %language, error = %e, "Session creation failed");
                error_response(&e, trace_id)
            }
        },
        Operation::CreateExecution {
            container_id,
            language,
            code,
        } => match manager.execute(&container_id, &language, &code).await {
            Ok(output) => (StatusCode::CREATED, Json(output)).into_response(),
            Err(e) => {
                tracing::error!(trace_id = %trace_id, container_id = %container_id, error = %e, "Execution failed");
                error_response(&e, trace_id)
            }
        },
        Operation::KillSession { container_id } => {
            let outcome = manager.kill_session(&container_id).await;
            tracing::debug!(trace_id = %trace_id, container_id = %container_id, outcome = ?outcome, "Kill handled");
            StatusCode::OK.into_response()
        }
    }
}
