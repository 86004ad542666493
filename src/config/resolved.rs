//! Resolved action specs: defaults applied, input validated, ready for stage assembly.

use crate::config::{BodyParsingOptions, HttpMethod, ValidationSpec};
use crate::routes::Middleware;
use std::fmt;
use std::sync::Arc;

/// The five standard actions in canonical order, with their default method and endpoint.
pub const STANDARD_ACTIONS: [(ActionName, HttpMethod, &str); 5] = [
    (ActionName::Create, HttpMethod::Post, ""),
    (ActionName::Index, HttpMethod::Get, ""),
    (ActionName::Get, HttpMethod::Get, "/:id"),
    (ActionName::Update, HttpMethod::Put, "/:id"),
    (ActionName::Delete, HttpMethod::Delete, "/:id"),
];

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActionName {
    Create,
    Index,
    Get,
    Update,
    Delete,
    Custom(String),
}

impl ActionName {
    pub fn parse(name: &str) -> Self {
        match name {
            "create" => ActionName::Create,
            "index" => ActionName::Index,
            "get" => ActionName::Get,
            "update" => ActionName::Update,
            "delete" => ActionName::Delete,
            other => ActionName::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionName::Create => "create",
            ActionName::Index => "index",
            ActionName::Get => "get",
            ActionName::Update => "update",
            ActionName::Delete => "delete",
            ActionName::Custom(name) => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, ActionName::Custom(_))
    }

    /// Default `(method, endpoint)` for standard actions; `None` for custom ones.
    pub fn defaults(&self) -> Option<(HttpMethod, &'static str)> {
        STANDARD_ACTIONS
            .iter()
            .find(|(name, _, _)| name == self)
            .map(|(_, method, endpoint)| (*method, *endpoint))
    }

    /// Position in the compiled output: standard actions first, customs after.
    pub(crate) fn rank(&self) -> usize {
        STANDARD_ACTIONS
            .iter()
            .position(|(name, _, _)| name == self)
            .unwrap_or(STANDARD_ACTIONS.len())
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct ActionSpec {
    pub name: ActionName,
    pub method: HttpMethod,
    pub endpoint: String,
    /// `None` when no schema was declared or the declared spec is empty.
    pub validation: Option<Arc<ValidationSpec>>,
    pub is_protected: bool,
    pub middlewares: Vec<Arc<dyn Middleware>>,
    pub body_parsing: BodyParsingOptions,
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("validation", &self.validation)
            .field("is_protected", &self.is_protected)
            .field("middlewares", &self.middlewares.len())
            .field("body_parsing", &self.body_parsing)
            .finish()
    }
}
