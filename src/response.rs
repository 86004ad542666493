//! Envelopes for handler responses: `{ "data": ... }` on success, the
//! [`ErrorBody`](crate::error::ErrorBody) shape on failure.

use crate::error::{ErrorBody, ErrorDetail};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaCount>,
}

#[derive(Serialize)]
pub struct MetaCount {
    pub count: usize,
}

fn respond<T: Serialize>(status: StatusCode, data: T, meta: Option<MetaCount>) -> Response {
    (status, Json(Envelope { data, meta })).into_response()
}

/// 200 with `{ "data": ... }`.
pub fn success_one<T: Serialize>(data: T) -> Response {
    respond(StatusCode::OK, data, None)
}

/// 201 with `{ "data": ... }`.
pub fn created<T: Serialize>(data: T) -> Response {
    respond(StatusCode::CREATED, data, None)
}

/// 200 with `{ "data": [...], "meta": { "count": n } }`.
pub fn success_many<T: Serialize>(data: Vec<T>) -> Response {
    let count = data.len();
    respond(StatusCode::OK, data, Some(MetaCount { count }))
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Error envelope for responses built outside [`AppError`](crate::error::AppError),
/// such as an authorizer's refusal.
pub fn error_body(code: &str, message: String, details: Option<serde_json::Value>) -> ErrorBody {
    ErrorBody {
        error: ErrorDetail {
            code: code.to_string(),
            message,
            details,
        },
    }
}
