//! routekit: declarative REST routes and pluggable mail/storage providers.
//!
//! Action tables compile into axum endpoints with a fixed stage chain (authenticate,
//! authorize, custom stages, parse body, validate, handler). The mail and storage
//! facades swap their backend at runtime through a shared provider lifecycle.

pub mod acl;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod provider;
pub mod response;
pub mod routes;
pub mod server;
pub mod service;
pub mod storage;

pub use acl::{Acl, Authorizer, Enforcer, EnforcerFactory, RestAuthorizer, StaticPolicy};
pub use auth::{Claims, JwtVerifier};
pub use config::{load_route_tables, ActionName, ActionSpecInput, ActionTable, HttpMethod, ServiceConfig};
pub use context::RequestContext;
pub use error::{AppError, CompileError, ConfigError, ProviderError, ServerError};
pub use handlers::Resource;
pub use mail::{Mail, MailInfo, MailOptions, MailProvider};
pub use provider::{ProviderRegistry, ProviderState};
pub use response::{created, error_body, no_content, success_many, success_one};
pub use routes::{common_routes, compile, CompiledRoute, Flow, Middleware, RouteOptions};
pub use server::{init_tracing, MicroService};
pub use storage::{Storage, StorageProvider, StoredFile};
