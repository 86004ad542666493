//! Service shell: compiled routes plus the cross-cutting HTTP layers.

use crate::config::ServiceConfig;
use crate::error::{AppError, ConfigError, ServerError};
use crate::handlers::Resource;
use crate::routes::{common_routes, CompiledRoute};
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over `default_directive`.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    // a second call (tests, embedding apps) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[derive(Debug)]
pub struct MicroService {
    config: ServiceConfig,
    routes: Router,
}

async fn not_found(uri: Uri) -> Response {
    AppError::NotFound(format!("no route for {}", uri.path())).into_response()
}

impl MicroService {
    pub fn new(config: ServiceConfig) -> Self {
        MicroService {
            config,
            routes: Router::new(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Mount the endpoints of a compiled resource.
    pub fn add_route<R: Resource>(mut self, route: CompiledRoute, resource: Arc<R>) -> Self {
        tracing::info!(resource = route.resource(), endpoints = route.actions().len(), "mounting resource");
        self.routes = self.routes.merge(route.into_router(resource));
        self
    }

    /// Mount plain axum routes next to the compiled ones.
    pub fn merge(mut self, router: Router) -> Self {
        self.routes = self.routes.merge(router);
        self
    }

    /// The full application: routes, common routes, static paths, 404 fallback and layers.
    /// Fails when a static url cannot be mounted.
    pub fn router(&self) -> Result<Router, ConfigError> {
        self.config.validate()?;
        let mut app = self.routes.clone().merge(common_routes());
        for static_path in &self.config.static_paths {
            tracing::info!(url = %static_path.url, path = %static_path.path.display(), "serving static files");
            app = app.nest_service(&static_path.url, ServeDir::new(&static_path.path));
        }
        let mut app = app
            .fallback(not_found)
            .layer(RequestBodyLimitLayer::new(self.config.body_limit));
        if self.config.cors {
            app = app.layer(CorsLayer::permissive());
        }
        if self.config.request_logging {
            app = app.layer(TraceLayer::new_for_http());
        }
        Ok(app)
    }

    /// Bind `host:port` and serve until Ctrl-C.
    pub async fn start(self) -> Result<(), ServerError> {
        let app = self.router()?;
        let address = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        tracing::info!("listening on {}", listener.local_addr()?);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticPath;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn unknown_path_gets_structured_404() {
        let app = MicroService::new(ServiceConfig::default()).router().unwrap();
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn health_and_static_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi").unwrap();
        let config = ServiceConfig {
            static_paths: vec![StaticPath {
                url: "/public".into(),
                path: dir.path().to_path_buf(),
            }],
            ..ServiceConfig::default()
        };
        let app = MicroService::new(config).router().unwrap();

        let health = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let file = app
            .oneshot(Request::builder().uri("/public/hello.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(file.status(), StatusCode::OK);
        assert_eq!(&to_bytes(file.into_body(), usize::MAX).await.unwrap()[..], b"hi");
    }

    #[test]
    fn unmountable_static_url_is_a_config_error() {
        for url in ["public", "/"] {
            let config = ServiceConfig {
                static_paths: vec![StaticPath {
                    url: url.into(),
                    path: "public".into(),
                }],
                ..ServiceConfig::default()
            };
            assert!(matches!(
                MicroService::new(config).router(),
                Err(ConfigError::InvalidOptions { .. })
            ));
        }
    }
}
