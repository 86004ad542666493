//! Binds compiled actions to an axum router.

use crate::context::RequestContext;
use crate::config::HttpMethod;
use crate::handlers::Resource;
use crate::routes::CompiledRoute;
use axum::extract::{Path, Query, Request};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Delete => MethodFilter::DELETE,
    }
}

impl CompiledRoute {
    /// One route per distinct path; actions sharing a path share a method router.
    pub fn into_router<R: Resource>(self, resource: Arc<R>) -> Router {
        let resource: Arc<dyn Resource> = resource;
        let mut by_path: Vec<(String, MethodRouter)> = Vec::new();

        for action in self.into_actions() {
            tracing::info!(method = %action.method, path = %action.path, action = %action.action, "endpoint registered");
            let filter = method_filter(action.method);
            let path = action.path.clone();
            let action = Arc::new(action);
            let resource = resource.clone();
            let handler = move |params: Option<Path<HashMap<String, String>>>,
                                query: Option<Query<HashMap<String, String>>>,
                                request: Request| {
                let action = action.clone();
                let resource = resource.clone();
                async move {
                    let ctx = RequestContext::from_parts(
                        request,
                        params.map(|Path(p)| p).unwrap_or_default(),
                        query.map(|Query(q)| q).unwrap_or_default(),
                    );
                    action.run(ctx, resource.as_ref()).await
                }
            };

            match by_path.iter().position(|(p, _)| *p == path) {
                Some(i) => {
                    let (p, methods) = by_path.remove(i);
                    by_path.insert(i, (p, methods.on(filter, handler)));
                }
                None => by_path.push((path, MethodRouter::new().on(filter, handler))),
            }
        }

        by_path
            .into_iter()
            .fold(Router::new(), |router, (path, methods)| router.route(&path, methods))
    }
}
