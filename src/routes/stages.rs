//! Request-processing stages of a compiled action.
//!
//! [`build_stages`] is a pure function of the action spec and the route options; the
//! order it produces is fixed: authenticate, authorize, custom stages, parse body,
//! validate. Each stage is present only when its condition holds.

use crate::acl::Acl;
use crate::auth::JwtVerifier;
use crate::config::{ActionSpec, BodyParsingOptions, ValidationSpec};
use crate::context::RequestContext;
use crate::error::{AppError, CompileError};
use crate::routes::RouteOptions;
use crate::service::RequestValidator;
use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use futures::StreamExt;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Outcome of a stage that did not fail.
pub enum Flow {
    Next,
    /// Stop the chain and answer with this response.
    Halt(Response),
}

/// Caller-supplied stage. Runs after authorization and before the body is read.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow, AppError>;
}

#[derive(Clone)]
pub enum Stage {
    Authenticate(JwtVerifier),
    Authorize(Acl),
    Custom(Arc<dyn Middleware>),
    ParseBody(BodyParsingOptions),
    Validate(Arc<ValidationSpec>),
}

/// Comparable description of a stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageKind {
    Authenticate,
    Authorize,
    Custom(String),
    ParseBody,
    Validate,
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Authenticate(_) => StageKind::Authenticate,
            Stage::Authorize(_) => StageKind::Authorize,
            Stage::Custom(m) => StageKind::Custom(m.name().to_string()),
            Stage::ParseBody(_) => StageKind::ParseBody,
            Stage::Validate(_) => StageKind::Validate,
        }
    }

    pub async fn apply(&self, ctx: &mut RequestContext) -> Result<Flow, AppError> {
        match self {
            Stage::Authenticate(verifier) => {
                verifier.authenticate(ctx)?;
                Ok(Flow::Next)
            }
            Stage::Authorize(acl) => Ok(match acl.authorize(ctx).await? {
                Some(response) => Flow::Halt(response),
                None => Flow::Next,
            }),
            Stage::Custom(middleware) => middleware.handle(ctx).await,
            Stage::ParseBody(options) => {
                ctx.body = parse_body(ctx, options).await?;
                Ok(Flow::Next)
            }
            Stage::Validate(spec) => {
                let validated = RequestValidator::validate_request(spec, &ctx.body, &ctx.params, &ctx.query)?;
                ctx.body = validated.body;
                ctx.params = validated.params;
                ctx.query = validated.query;
                Ok(Flow::Next)
            }
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind())
    }
}

/// Stage list for one action. Fails when the action is protected and the route has no
/// signing secret.
pub fn build_stages(resource: &str, spec: &ActionSpec, options: &RouteOptions) -> Result<Vec<Stage>, CompileError> {
    let mut stages = Vec::new();
    if spec.is_protected {
        let secret = options.secret().ok_or_else(|| CompileError::InvalidJwtSecret {
            resource: resource.to_string(),
            endpoint: spec.endpoint.clone(),
            action: spec.name.to_string(),
        })?;
        stages.push(Stage::Authenticate(JwtVerifier::new(secret)));
    }
    if let Some(acl) = &options.acl {
        stages.push(Stage::Authorize(acl.clone()));
    }
    stages.extend(spec.middlewares.iter().cloned().map(Stage::Custom));
    if options.body_parsing {
        stages.push(Stage::ParseBody(spec.body_parsing.clone()));
    }
    if let Some(validation) = &spec.validation {
        stages.push(Stage::Validate(validation.clone()));
    }
    Ok(stages)
}

async fn parse_body(ctx: &mut RequestContext, options: &BodyParsingOptions) -> Result<Value, AppError> {
    let Some(body) = ctx.raw_body.take() else {
        return Ok(Value::Object(Default::default()));
    };
    if let Some(len) = ctx.header("content-length").and_then(|v| v.parse::<usize>().ok()) {
        if len > options.limit {
            return Err(AppError::PayloadTooLarge { limit: options.limit });
        }
    }

    let mut stream = body.into_data_stream();
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("failed to read body: {}", e)))?;
        if buf.len() + chunk.len() > options.limit {
            return Err(AppError::PayloadTooLarge { limit: options.limit });
        }
        buf.extend_from_slice(&chunk);
    }

    let content_type = ctx
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_ascii_lowercase());
    match content_type.as_deref() {
        None => parse_json(&buf),
        Some(ct) if ct.starts_with("application/json") || ct.contains("+json") => parse_json(&buf),
        Some(ct) if ct.starts_with("text/") && options.text => String::from_utf8(buf)
            .map(Value::String)
            .map_err(|_| AppError::BadRequest("body is not valid UTF-8".into())),
        Some(ct) => Err(AppError::UnsupportedMediaType(ct.to_string())),
    }
}

fn parse_json(buf: &[u8]) -> Result<Value, AppError> {
    if buf.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(buf).map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))
}
