//! Shared plumbing for backends that talk to a vendor HTTP API.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::ProviderError;

pub(crate) const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

pub(crate) fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

pub(crate) fn client(provider: &'static str, timeout_seconds: u64) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::InvalidOptions {
            provider,
            message: e.to_string(),
        })
}

/// Non-success response turned into an operation failure carrying status and body.
pub(crate) async fn api_error(provider: &'static str, response: Response) -> ProviderError {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    tracing::warn!(provider, status = status.as_u16(), body = %text, "vendor API error");
    ProviderError::failed(provider, format!("{} - {}", status.as_u16(), text))
}

pub(crate) fn transport(provider: &'static str, err: reqwest::Error) -> ProviderError {
    ProviderError::failed(provider, format!("HTTP request failed: {}", err))
}

/// Base URL option with any trailing slash removed.
pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
