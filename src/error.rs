//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::service::ValidationError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid options at {path}: {message}")]
    InvalidOptions { path: String, message: String },
    #[error("config load: {0}")]
    Load(String),
}

/// Route table invariant violations. Compilation is all-or-nothing, so any of these
/// means no endpoint of the resource was produced.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("route-invalid-options: {path}: {message}")]
    InvalidOptions { path: String, message: String },
    #[error("route-invalid-jwt-secret: {resource}{endpoint} {action}")]
    InvalidJwtSecret {
        resource: String,
        endpoint: String,
        action: String,
    },
    #[error("route-duplicate-endpoint: {method} {path} declared by both {first} and {second}")]
    DuplicateEndpoint {
        method: String,
        path: String,
        first: String,
        second: String,
    },
    #[error("route-conflicting-parameter: {second} {path} names a parameter differently from {first} {other}")]
    ConflictingParameter {
        path: String,
        other: String,
        first: String,
        second: String,
    },
}

impl CompileError {
    pub(crate) fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        CompileError::InvalidOptions {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Failures of the provider lifecycle and of provider operations, shared by the mail
/// and storage facades.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("invalid options for {provider}: {message}")]
    InvalidOptions { provider: &'static str, message: String },
    #[error("{provider} connect failed: {message}")]
    Connect { provider: &'static str, message: String },
    #[error("no provider configured")]
    NoProviderConfigured,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{provider}: {key} not found")]
    NotFound { provider: &'static str, key: String },
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
    },
    #[error("{provider} operation failed: {message}")]
    OperationFailed { provider: &'static str, message: String },
}

impl ProviderError {
    pub(crate) fn failed(provider: &'static str, message: impl ToString) -> Self {
        ProviderError::OperationFailed {
            provider,
            message: message.to_string(),
        }
    }

    pub(crate) fn connect(provider: &'static str, message: impl ToString) -> Self {
        ProviderError::Connect {
            provider,
            message: message.to_string(),
        }
    }
}

/// Failures of the service shell itself.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("cannot bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Request-time errors. Every variant maps to one HTTP status via [`IntoResponse`].
#[derive(Error, Debug)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden")]
    Forbidden,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payload too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("action not implemented: {0}")]
    NotImplemented(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("internal: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Provider(ProviderError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Provider(ProviderError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::Validation(_) => "validation_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::PayloadTooLarge { .. } => "payload_too_large",
            AppError::UnsupportedMediaType(_) => "unsupported_media_type",
            AppError::NotImplemented(_) => "not_implemented",
            AppError::Provider(_) => "provider_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation(e) => Some(serde_json::json!({
                "section": e.section.as_str(),
                "field": e.field,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        (status, Json(body)).into_response()
    }
}
