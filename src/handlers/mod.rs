//! Handler contract for compiled resources.
//!
//! A resource implements the actions its table declares; the others keep the default
//! body and answer 501. Custom actions arrive through [`Resource::custom`] with their
//! declared name.

use crate::config::ActionName;
use crate::context::RequestContext;
use crate::error::AppError;
use async_trait::async_trait;
use axum::response::Response;

#[async_trait]
pub trait Resource: Send + Sync + 'static {
    async fn create(&self, _ctx: RequestContext) -> Result<Response, AppError> {
        Err(AppError::NotImplemented("create".into()))
    }

    async fn index(&self, _ctx: RequestContext) -> Result<Response, AppError> {
        Err(AppError::NotImplemented("index".into()))
    }

    async fn get(&self, _ctx: RequestContext) -> Result<Response, AppError> {
        Err(AppError::NotImplemented("get".into()))
    }

    async fn update(&self, _ctx: RequestContext) -> Result<Response, AppError> {
        Err(AppError::NotImplemented("update".into()))
    }

    async fn delete(&self, _ctx: RequestContext) -> Result<Response, AppError> {
        Err(AppError::NotImplemented("delete".into()))
    }

    async fn custom(&self, action: &str, _ctx: RequestContext) -> Result<Response, AppError> {
        Err(AppError::NotImplemented(action.to_string()))
    }
}

pub async fn dispatch(resource: &dyn Resource, action: &ActionName, ctx: RequestContext) -> Result<Response, AppError> {
    match action {
        ActionName::Create => resource.create(ctx).await,
        ActionName::Index => resource.index(ctx).await,
        ActionName::Get => resource.get(ctx).await,
        ActionName::Update => resource.update(ctx).await,
        ActionName::Delete => resource.delete(ctx).await,
        ActionName::Custom(name) => resource.custom(name, ctx).await,
    }
}
