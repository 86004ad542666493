//! Bearer token verification for protected actions.

use crate::context::RequestContext;
use crate::error::AppError;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Decoded token payload. Only `role` is interpreted (by the default authorizer);
/// everything else is kept as-is for handlers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// HS256 verifier built from the route's signing secret.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // exp is still checked when present; aud is passed through to handlers
        validation.required_spec_claims = HashSet::new();
        validation.validate_aud = false;
        JwtVerifier {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(e.to_string()))
    }

    /// Verify the request's bearer token and store its claims on the context.
    pub fn authenticate(&self, ctx: &mut RequestContext) -> Result<(), AppError> {
        let token = bearer_token(ctx)?;
        let claims = self.verify(token)?;
        tracing::debug!(sub = ?claims.sub, "bearer token accepted");
        ctx.claims = Some(claims);
        Ok(())
    }
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

fn bearer_token(ctx: &RequestContext) -> Result<&str, AppError> {
    let header = ctx
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing authorization header".into()))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("expected a bearer token".into()))
}
