//! Route compilation and request execution.

pub mod common;
pub mod compiler;
mod mount;
mod pipeline;
pub mod stages;

pub use common::common_routes;
pub use compiler::{compile, CompiledAction, CompiledRoute, RouteOptions};
pub use stages::{build_stages, Flow, Middleware, Stage, StageKind};
