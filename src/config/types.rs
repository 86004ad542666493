//! Raw config types: action tables, validation rules and service options.
//!
//! Every struct here is a closed schema (`deny_unknown_fields`); unknown keys are rejected
//! at deserialization time, before anything is compiled or started.

use crate::routes::Middleware;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Get,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

/// Per-field rule. `type` drives coercion of string inputs (path params and query values
/// always arrive as strings); `default` fills absent fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FieldRule {
    #[serde(default, rename = "type")]
    pub kind: Option<FieldType>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl FieldRule {
    pub fn of(kind: FieldType) -> Self {
        FieldRule {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = Some(true);
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Field name -> rule. Keys not listed are rejected by the validator.
pub type ObjectSchema = BTreeMap<String, FieldRule>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationSpec {
    #[serde(default)]
    pub body: Option<ObjectSchema>,
    #[serde(default)]
    pub params: Option<ObjectSchema>,
    #[serde(default)]
    pub query: Option<ObjectSchema>,
}

impl ValidationSpec {
    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.params.is_none() && self.query.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BodyParsingOptions {
    /// Maximum body size in bytes.
    #[serde(default = "default_body_limit")]
    pub limit: usize,
    /// Accept `text/*` bodies as a JSON string.
    #[serde(default)]
    pub text: bool,
}

impl Default for BodyParsingOptions {
    fn default() -> Self {
        BodyParsingOptions {
            limit: DEFAULT_BODY_LIMIT,
            text: false,
        }
    }
}

fn default_body_limit() -> usize {
    DEFAULT_BODY_LIMIT
}

/// One entry of an action table as declared by the caller. Standard actions may omit
/// `method` and `endpoint`; custom actions must set both.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ActionSpecInput {
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub validation: Option<ValidationSpec>,
    #[serde(default)]
    pub is_protected: bool,
    #[serde(default)]
    pub body_parsing_options: Option<BodyParsingOptions>,
    /// Runtime stages; not expressible in JSON.
    #[serde(skip)]
    pub middlewares: Vec<Arc<dyn Middleware>>,
}

impl ActionSpecInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn validation(mut self, validation: ValidationSpec) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn protected(mut self) -> Self {
        self.is_protected = true;
        self
    }

    pub fn body_parsing_options(mut self, options: BodyParsingOptions) -> Self {
        self.body_parsing_options = Some(options);
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }
}

impl fmt::Debug for ActionSpecInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpecInput")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("validation", &self.validation)
            .field("is_protected", &self.is_protected)
            .field("body_parsing_options", &self.body_parsing_options)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

/// Action name -> declared spec, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct ActionTable {
    pub(crate) entries: Vec<(String, ActionSpecInput)>,
    /// Actions named by [`ActionTable::middleware`] that were not declared at the time.
    pub(crate) unmatched: Vec<String>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an action, or replaces the spec of one already declared. Custom stages
    /// attached to the old spec are kept ahead of the new spec's own.
    pub fn action(mut self, name: impl Into<String>, mut spec: ActionSpecInput) -> Self {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => {
                let mut middlewares = std::mem::take(&mut entry.1.middlewares);
                middlewares.append(&mut spec.middlewares);
                spec.middlewares = middlewares;
                entry.1 = spec;
            }
            None => self.entries.push((name, spec)),
        }
        self
    }

    /// Appends a custom stage to an action already in the table. Naming an action
    /// that is not declared yet makes [`compile`](crate::compile) fail.
    pub fn middleware(mut self, action: &str, middleware: Arc<dyn Middleware>) -> Self {
        match self.entries.iter_mut().find(|(n, _)| n == action) {
            Some((_, spec)) => spec.middlewares.push(middleware),
            None => self.unmatched.push(action.to_string()),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticPath {
    pub url: String,
    pub path: PathBuf,
}

/// Options of the service shell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub request_logging: bool,
    #[serde(default = "default_true")]
    pub cors: bool,
    #[serde(default)]
    pub static_paths: Vec<StaticPath>,
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            host: default_host(),
            port: DEFAULT_PORT,
            request_logging: true,
            cors: true,
            static_paths: Vec::new(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

pub(crate) fn type_name_of_json(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
