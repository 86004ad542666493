//! Load action tables and service options from JSON values, files or the environment.

use crate::config::{ActionSpecInput, ActionTable, ServiceConfig};
use crate::error::{CompileError, ConfigError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

impl ActionTable {
    /// Parse an action table from a JSON object. Errors carry the action path
    /// (e.g. `routes.feed: unknown field ...`).
    pub fn from_value(value: &Value) -> Result<Self, CompileError> {
        let obj = value
            .as_object()
            .ok_or_else(|| CompileError::invalid("routes", "action table must be a JSON object"))?;
        let mut table = ActionTable::new();
        for (name, spec) in obj {
            let input: ActionSpecInput = serde_json::from_value(spec.clone())
                .map_err(|e| CompileError::invalid(format!("routes.{}", name), e.to_string()))?;
            table = table.action(name.clone(), input);
        }
        Ok(table)
    }
}

/// Read a JSON file mapping resource names to action tables, e.g.
/// `{ "pets": { "create": {}, "get": { ... } } }`.
pub async fn load_route_tables(path: impl AsRef<Path>) -> Result<BTreeMap<String, ActionTable>, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let value: Value =
        serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let resources = value.as_object().ok_or_else(|| ConfigError::InvalidOptions {
        path: path.display().to_string(),
        message: "expected an object of resource name -> action table".into(),
    })?;

    let mut out = BTreeMap::new();
    for (resource, table) in resources {
        tracing::debug!(resource = %resource, "loading action table");
        let table = ActionTable::from_value(table).map_err(|e| ConfigError::InvalidOptions {
            path: resource.clone(),
            message: e.to_string(),
        })?;
        out.insert(resource.clone(), table);
    }
    Ok(out)
}

impl ServiceConfig {
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_json::from_value(value).map_err(|e| ConfigError::InvalidOptions {
            path: "service".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks what serde cannot: every static url is an absolute mount point other
    /// than `/`, without route parameters or wildcards.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, static_path) in self.static_paths.iter().enumerate() {
            let url = static_path.url.as_str();
            let problem = if !url.starts_with('/') {
                Some("must start with '/'")
            } else if url.trim_end_matches('/').is_empty() {
                Some("must not be the root path")
            } else if url.ends_with('/') {
                Some("must not end with '/'")
            } else if url.contains(':') || url.contains('*') {
                Some("must not contain route parameters or wildcards")
            } else {
                None
            };
            if let Some(problem) = problem {
                return Err(ConfigError::InvalidOptions {
                    path: format!("staticPaths[{}].url", i),
                    message: format!("'{}' {}", url, problem),
                });
            }
        }
        Ok(())
    }

    /// Defaults overridden by `HOST`, `PORT`, `REQUEST_LOGGING`, `CORS` and `BODY_LIMIT`.
    /// Loads `.env` first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = ServiceConfig::default();
        if let Ok(host) = std::env::var("HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse::<u16>("PORT")? {
            config.port = port;
        }
        if let Some(flag) = env_flag("REQUEST_LOGGING")? {
            config.request_logging = flag;
        }
        if let Some(flag) = env_flag("CORS")? {
            config.cors = flag;
        }
        if let Some(limit) = env_parse::<usize>("BODY_LIMIT")? {
            config.body_limit = limit;
        }
        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidOptions {
            path: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

fn env_flag(key: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(ConfigError::InvalidOptions {
                path: key.to_string(),
                message: format!("expected a boolean, got '{}'", other),
            }),
        },
        Err(_) => Ok(None),
    }
}
