//! Request execution for a compiled action.

use crate::context::RequestContext;
use crate::error::AppError;
use crate::handlers::{dispatch, Resource};
use crate::routes::{CompiledAction, Flow};
use axum::response::{IntoResponse, Response};

impl CompiledAction {
    /// Runs the stages in order, then the handler. A failing stage is answered with its
    /// error; a halting stage with its own response. Later stages do not run in either case.
    pub async fn run(&self, ctx: RequestContext, resource: &dyn Resource) -> Response {
        match self.execute(ctx, resource).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(action = %self.action, path = %self.path, error = %err, "request rejected");
                err.into_response()
            }
        }
    }

    pub async fn execute(&self, mut ctx: RequestContext, resource: &dyn Resource) -> Result<Response, AppError> {
        for stage in &self.stages {
            if let Flow::Halt(response) = stage.apply(&mut ctx).await? {
                tracing::debug!(action = %self.action, stage = ?stage.kind(), "chain halted");
                return Ok(response);
            }
        }
        dispatch(resource, &self.action, ctx).await
    }
}
