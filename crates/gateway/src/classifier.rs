//! Request classifier.
//!
//! Decodes an untyped JSON payload into one of the three operations the
//! gateway understands. Each operation has its own schema and the schemas
//! are tried in a fixed order; the first that decodes wins:
//!
//! | Operation         | Keys                                    |
//! |-------------------|-----------------------------------------|
//! | `CreateSession`   | exactly `language`                      |
//! | `CreateExecution` | at least `containerId`, `language`, `code` |
//! | `KillSession`     | exactly `containerId`                   |
//!
//! No payload can satisfy two of these schemas, so the order only fixes
//! which error is reported, never which operation is chosen.

use axum::http::Method;
use serde::Deserialize;
use serde_json::Value;

use replbox_core::{ContainerId, Error, Result};

/// A classified request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    CreateSession {
        language: String,
    },
    CreateExecution {
        container_id: ContainerId,
        language: String,
        code: String,
    },
    KillSession {
        container_id: ContainerId,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateSession { .. } => "create_session",
            Operation::CreateExecution { .. } => "create_execution",
            Operation::KillSession { .. } => "kill_session",
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateSessionShape {
    language: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateExecutionShape {
    container_id: ContainerId,
    language: String,
    code: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct KillSessionShape {
    container_id: ContainerId,
}

const EXPECTED_SHAPES: &str =
    "expected {language}, {containerId, language, code} or {containerId}";

/// Classify a payload by shape alone.
pub fn classify(payload: &Value) -> Result<Operation> {
    if !payload.is_object() {
        return Err(Error::malformed("payload must be a JSON object"));
    }

    if let Ok(CreateSessionShape { language }) = CreateSessionShape::deserialize(payload) {
        return Ok(Operation::CreateSession { language });
    }
    if let Ok(shape) = CreateExecutionShape::deserialize(payload) {
        return Ok(Operation::CreateExecution {
            container_id: shape.container_id,
            language: shape.language,
            code: shape.code,
        });
    }
    if let Ok(KillSessionShape { container_id }) = KillSessionShape::deserialize(payload) {
        return Ok(Operation::KillSession { container_id });
    }

    Err(Error::malformed(format!(
        "payload does not match any operation ({})",
        EXPECTED_SHAPES
    )))
}

/// Classify a payload in the context of its HTTP method.
///
/// `DELETE` only accepts a kill payload. Other methods accept create and
/// execute payloads; a kill payload must come with `DELETE`.
pub fn classify_request(method: &Method, payload: &Value) -> Result<Operation> {
    if method == Method::DELETE {
        return match classify(payload)? {
            op @ Operation::KillSession { .. } => Ok(op),
            other => Err(Error::malformed(format!(
                "DELETE expects {{containerId}}, got a {} payload",
                other.name()
            ))),
        };
    }

    match classify(payload)? {
        Operation::KillSession { .. } => Err(Error::malformed(
            "killing a session requires the DELETE method",
        )),
        op => Ok(op),
    }
}
