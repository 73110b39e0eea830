use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Serialize;

use stockgate_infra::intake::{IntakeError, IntakeErrorKind};

/// One entry of the error payload's `details` array.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub message: String,
    pub field: Option<String>,
}

/// The wire error payload, identical for every failure and every strategy:
///
/// ```json
/// { "error": "<TypeName>",
///   "details": [ { "type": "<TypeName>", "message": "...", "field": null } ],
///   "timestamp": "<ISO-8601>" }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub details: Vec<ErrorDetail>,
    pub timestamp: String,
}

impl ErrorBody {
    pub fn new(error_type: &'static str, message: String, field: Option<String>) -> Self {
        Self {
            error: error_type,
            details: vec![ErrorDetail {
                error_type,
                message,
                field,
            }],
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

fn status_for(kind: IntakeErrorKind) -> StatusCode {
    match kind {
        IntakeErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        IntakeErrorKind::NotFound => StatusCode::NOT_FOUND,
        IntakeErrorKind::InsufficientStock => StatusCode::CONFLICT,
        IntakeErrorKind::ConcurrentConflict => StatusCode::CONFLICT,
        IntakeErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render a classified intake failure as the wire payload.
pub fn intake_error_to_response(err: IntakeError) -> axum::response::Response {
    let kind = err.kind();
    let body = ErrorBody::new(
        kind.type_name(),
        err.message(),
        err.field().map(|s| s.to_string()),
    );
    (status_for(kind), axum::Json(body)).into_response()
}

/// Shorthand for request-shape failures caught before the coordinator
/// (e.g. unparseable path IDs).
pub fn validation_error(message: impl Into<String>, field: &str) -> axum::response::Response {
    let body = ErrorBody::new("ValidationError", message.into(), Some(field.to_string()));
    (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(body)).into_response()
}
