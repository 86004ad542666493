//! Per-request state threaded through the stages of a compiled action.

use crate::auth::Claims;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Uri};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Path parameters bound by the router (`:id` -> `"42"`), coerced after validation.
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    /// Parsed body. `Null` until the body-parsing stage runs.
    pub body: Value,
    /// Unread request body; taken by the body-parsing stage.
    pub raw_body: Option<Body>,
    /// Claims of a verified bearer token, set by the authentication stage.
    pub claims: Option<Claims>,
}

impl RequestContext {
    pub fn new(method: Method, uri: Uri) -> Self {
        RequestContext {
            method,
            uri,
            headers: HeaderMap::new(),
            params: Map::new(),
            query: Map::new(),
            body: Value::Null,
            raw_body: None,
            claims: None,
        }
    }

    pub fn from_parts(
        request: axum::extract::Request,
        params: HashMap<String, String>,
        query: HashMap<String, String>,
    ) -> Self {
        let (parts, body) = request.into_parts();
        RequestContext {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            params: string_map(params),
            query: string_map(query),
            body: Value::Null,
            raw_body: Some(body),
            claims: None,
        }
    }

    pub fn with_header(mut self, name: axum::http::HeaderName, value: axum::http::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.raw_body = Some(body.into());
        self
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

fn string_map(m: HashMap<String, String>) -> Map<String, Value> {
    m.into_iter().map(|(k, v)| (k, Value::String(v))).collect()
}
