//! Access control for compiled routes.
//!
//! An [`Acl`] pairs an enforcer source with an [`Authorizer`]. The authorization stage
//! asks the source for an enforcer on every request (so policies can be reloaded),
//! then lets the authorizer decide. A refusal is answered by
//! [`Authorizer::on_error`] and the chain stops there.

use crate::context::RequestContext;
use crate::error::AppError;
use crate::response::error_body;
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::fmt;
use std::sync::Arc;

/// Decides whether `subject` may perform `action` on `object`.
pub trait Enforcer: Send + Sync {
    fn enforce(&self, subject: &str, object: &str, action: &str) -> bool;
}

/// Produces the enforcer used for one request.
#[async_trait]
pub trait EnforcerFactory: Send + Sync {
    async fn enforcer(&self) -> Result<Arc<dyn Enforcer>, AppError>;
}

/// A fixed enforcer shared by all requests.
#[async_trait]
impl<E: Enforcer + 'static> EnforcerFactory for Arc<E> {
    async fn enforcer(&self) -> Result<Arc<dyn Enforcer>, AppError> {
        Ok(self.clone() as Arc<dyn Enforcer>)
    }
}

pub trait Authorizer: Send + Sync {
    /// Role of the caller. Default: the `role` claim of the verified token, or `guest`.
    fn user_role(&self, ctx: &RequestContext) -> String {
        ctx.claims
            .as_ref()
            .and_then(|c| c.role.clone())
            .unwrap_or_else(|| "guest".to_string())
    }

    /// Default: enforce `(role, request path, method)`.
    fn check_permission(&self, ctx: &RequestContext, enforcer: &dyn Enforcer) -> bool {
        let role = self.user_role(ctx);
        enforcer.enforce(&role, ctx.path(), ctx.method.as_str())
    }

    /// Response sent when permission is refused. Default: 403 with a forbidden body.
    fn on_error(&self, _ctx: &RequestContext) -> Response {
        (
            StatusCode::FORBIDDEN,
            Json(error_body("forbidden", "forbidden".into(), None)),
        )
            .into_response()
    }
}

/// Authorizer with all default behaviors.
#[derive(Clone, Copy, Debug, Default)]
pub struct RestAuthorizer;

impl Authorizer for RestAuthorizer {}

#[derive(Clone)]
pub struct Acl {
    pub enforcer: Arc<dyn EnforcerFactory>,
    pub authorizer: Arc<dyn Authorizer>,
}

impl Acl {
    pub fn new(enforcer: impl EnforcerFactory + 'static) -> Self {
        Acl {
            enforcer: Arc::new(enforcer),
            authorizer: Arc::new(RestAuthorizer),
        }
    }

    /// ACL over one enforcer that never changes.
    pub fn fixed(enforcer: impl Enforcer + 'static) -> Self {
        Self::new(Arc::new(enforcer))
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// `Ok(None)` when allowed, `Ok(Some(response))` when refused.
    pub async fn authorize(&self, ctx: &mut RequestContext) -> Result<Option<Response>, AppError> {
        let enforcer = self.enforcer.enforcer().await?;
        if self.authorizer.check_permission(ctx, enforcer.as_ref()) {
            Ok(None)
        } else {
            tracing::debug!(path = %ctx.path(), method = %ctx.method, "permission refused");
            Ok(Some(self.authorizer.on_error(ctx)))
        }
    }
}

impl fmt::Debug for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acl").finish_non_exhaustive()
    }
}

/// One allow rule. `object` ending in `*` matches by prefix; `action` `*` matches any method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyRule {
    pub subject: String,
    pub object: String,
    pub action: String,
}

/// In-memory allow-list enforcer.
#[derive(Clone, Debug, Default)]
pub struct StaticPolicy {
    rules: Vec<PolicyRule>,
}

impl StaticPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, subject: &str, object: &str, action: &str) -> Self {
        self.rules.push(PolicyRule {
            subject: subject.to_string(),
            object: object.to_string(),
            action: action.to_uppercase(),
        });
        self
    }
}

impl Enforcer for StaticPolicy {
    fn enforce(&self, subject: &str, object: &str, action: &str) -> bool {
        self.rules.iter().any(|r| {
            r.subject == subject
                && (r.action == "*" || r.action.eq_ignore_ascii_case(action))
                && match r.object.strip_suffix('*') {
                    Some(prefix) => object.starts_with(prefix),
                    None => r.object == object,
                }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Claims;
    use axum::http::{Method, Uri};

    fn ctx(role: Option<&str>) -> RequestContext {
        let mut ctx = RequestContext::new(Method::GET, Uri::from_static("/pets/1"));
        ctx.claims = role.map(|r| Claims {
            sub: None,
            role: Some(r.to_string()),
            exp: None,
            extra: Default::default(),
        });
        ctx
    }

    #[test]
    fn static_policy_matching() {
        let policy = StaticPolicy::new().allow("admin", "/pets*", "*").allow("guest", "/pets", "get");
        assert!(policy.enforce("admin", "/pets/1", "DELETE"));
        assert!(policy.enforce("guest", "/pets", "GET"));
        assert!(!policy.enforce("guest", "/pets/1", "GET"));
        assert!(!policy.enforce("user", "/pets", "GET"));
    }

    #[test]
    fn default_role_is_guest() {
        assert_eq!(RestAuthorizer.user_role(&ctx(None)), "guest");
        assert_eq!(RestAuthorizer.user_role(&ctx(Some("admin"))), "admin");
    }

    #[tokio::test]
    async fn refusal_yields_forbidden_response() {
        let acl = Acl::fixed(StaticPolicy::new().allow("admin", "/pets*", "*"));
        assert!(acl.authorize(&mut ctx(Some("admin"))).await.unwrap().is_none());
        let response = acl.authorize(&mut ctx(None)).await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
