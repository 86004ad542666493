//! Compiles an action table into the ordered endpoint list of one resource.
//!
//! Compilation is all-or-nothing: every action is resolved and given its stage list
//! before anything is returned. Output order is deterministic, standard actions first
//! (create, index, get, update, delete) then custom actions in declaration order.

use crate::acl::Acl;
use crate::config::{normalize_resource_name, validate_action, ActionName, ActionTable, HttpMethod};
use crate::error::CompileError;
use crate::routes::stages::{build_stages, Stage, StageKind};
use std::collections::HashMap;

/// Route-wide settings shared by every action of a resource.
#[derive(Clone, Debug, Default)]
pub struct RouteOptions {
    /// Add a body-parsing stage to every action.
    pub body_parsing: bool,
    /// HS256 secret for protected actions. An empty string counts as absent.
    pub signing_secret: Option<String>,
    pub acl: Option<Acl>,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body_parsing(mut self, enabled: bool) -> Self {
        self.body_parsing = enabled;
        self
    }

    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = Some(secret.into());
        self
    }

    pub fn with_acl(mut self, acl: Acl) -> Self {
        self.acl = Some(acl);
        self
    }

    pub(crate) fn secret(&self) -> Option<&str> {
        self.signing_secret.as_deref().filter(|s| !s.is_empty())
    }
}

/// One registered endpoint with its stage chain.
#[derive(Clone, Debug)]
pub struct CompiledAction {
    pub action: ActionName,
    pub method: HttpMethod,
    /// `/` + resource name + endpoint, in router syntax (`/pets/:id`).
    pub path: String,
    pub stages: Vec<Stage>,
}

impl CompiledAction {
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(Stage::kind).collect()
    }
}

#[derive(Clone, Debug)]
pub struct CompiledRoute {
    resource: String,
    actions: Vec<CompiledAction>,
}

impl CompiledRoute {
    /// Normalized resource name (`"pets"` for `"/pets/"`).
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn actions(&self) -> &[CompiledAction] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&CompiledAction> {
        self.actions.iter().find(|a| a.action.as_str() == name)
    }

    pub fn endpoints(&self) -> Vec<(HttpMethod, String)> {
        self.actions.iter().map(|a| (a.method, a.path.clone())).collect()
    }

    pub(crate) fn into_actions(self) -> Vec<CompiledAction> {
        self.actions
    }
}

/// Compile `table` for the resource `name`.
pub fn compile(name: &str, table: &ActionTable, options: &RouteOptions) -> Result<CompiledRoute, CompileError> {
    let resource = normalize_resource_name(name)?;
    if let Some(action) = table.unmatched.first() {
        return Err(CompileError::invalid(
            format!("{}.{}", resource, action),
            "middleware attached to an undeclared action",
        ));
    }

    let mut specs = table
        .entries
        .iter()
        .map(|(action, input)| validate_action(&resource, action, input))
        .collect::<Result<Vec<_>, _>>()?;
    // stable: custom actions keep declaration order
    specs.sort_by_key(|s| s.name.rank());

    let mut actions = Vec::with_capacity(specs.len());
    let mut seen: HashMap<(HttpMethod, String), String> = HashMap::new();
    for spec in specs {
        let path = format!("/{}{}", resource, spec.endpoint);
        if let Some(first) = seen.get(&(spec.method, path.clone())) {
            return Err(CompileError::DuplicateEndpoint {
                method: spec.method.to_string(),
                path,
                first: first.clone(),
                second: spec.name.to_string(),
            });
        }
        if let Some(other) = actions.iter().find(|a: &&CompiledAction| param_names_differ(&a.path, &path)) {
            return Err(CompileError::ConflictingParameter {
                path,
                other: other.path.clone(),
                first: other.action.to_string(),
                second: spec.name.to_string(),
            });
        }
        let stages = build_stages(&resource, &spec, options)?;
        seen.insert((spec.method, path.clone()), spec.name.to_string());
        actions.push(CompiledAction {
            action: spec.name,
            method: spec.method,
            path,
            stages,
        });
    }

    tracing::debug!(resource = %resource, endpoints = actions.len(), "route compiled");
    Ok(CompiledRoute { resource, actions })
}

/// True when two paths share a prefix up to a parameter position where they use
/// different names (`/pets/:id` and `/pets/:name/feed`). The router keeps a single
/// parameter name per position.
fn param_names_differ(a: &str, b: &str) -> bool {
    for (x, y) in a.split('/').zip(b.split('/')) {
        match (x.strip_prefix(':'), y.strip_prefix(':')) {
            (Some(p), Some(q)) if p != q => return true,
            (Some(_), Some(_)) => {}
            _ if x == y => {}
            _ => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActionSpecInput, FieldRule, FieldType, ValidationSpec};

    fn get_with_integer_id() -> ActionSpecInput {
        let validation = ValidationSpec {
            params: Some([("id".to_string(), FieldRule::of(FieldType::Integer).required())].into()),
            ..Default::default()
        };
        ActionSpecInput::new().validation(validation)
    }

    #[test]
    fn standard_actions_come_first_in_fixed_order() {
        let table = ActionTable::new()
            .action(
                "feed",
                ActionSpecInput::new().method(HttpMethod::Post).endpoint("/:id/feed"),
            )
            .action("delete", ActionSpecInput::new())
            .action("create", ActionSpecInput::new())
            .action("get", ActionSpecInput::new());
        let route = compile("/pets/", &table, &RouteOptions::new()).unwrap();
        assert_eq!(route.resource(), "pets");
        assert_eq!(
            route.endpoints(),
            vec![
                (HttpMethod::Post, "/pets".to_string()),
                (HttpMethod::Get, "/pets/:id".to_string()),
                (HttpMethod::Delete, "/pets/:id".to_string()),
                (HttpMethod::Post, "/pets/:id/feed".to_string()),
            ]
        );
    }

    #[test]
    fn stage_order_is_fixed() {
        let table = ActionTable::new().action("get", get_with_integer_id().protected());
        let acl = Acl::fixed(crate::acl::StaticPolicy::new());
        let options = RouteOptions::new()
            .with_body_parsing(true)
            .with_signing_secret("foo-bar")
            .with_acl(acl);
        let route = compile("pets", &table, &options).unwrap();
        assert_eq!(
            route.action("get").unwrap().stage_kinds(),
            vec![
                StageKind::Authenticate,
                StageKind::Authorize,
                StageKind::ParseBody,
                StageKind::Validate,
            ]
        );
    }

    #[test]
    fn unprotected_action_without_validation_has_no_stages() {
        let table = ActionTable::new().action(
            "feed",
            ActionSpecInput::new().method(HttpMethod::Post).endpoint("/:id/feed"),
        );
        let route = compile("pets", &table, &RouteOptions::new()).unwrap();
        assert!(route.action("feed").unwrap().stages.is_empty());
    }

    #[test]
    fn protected_action_needs_a_secret() {
        let table = ActionTable::new()
            .action("index", ActionSpecInput::new())
            .action("create", ActionSpecInput::new().protected());
        for options in [RouteOptions::new(), RouteOptions::new().with_signing_secret("")] {
            let err = compile("pets", &table, &options).unwrap_err();
            assert_eq!(err.to_string(), "route-invalid-jwt-secret: pets create");
        }
    }

    #[test]
    fn duplicate_method_and_path_is_rejected() {
        let table = ActionTable::new()
            .action("get", ActionSpecInput::new())
            .action(
                "show",
                ActionSpecInput::new().method(HttpMethod::Get).endpoint("/:id"),
            );
        let err = compile("pets", &table, &RouteOptions::new()).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateEndpoint { ref first, ref second, .. }
            if first == "get" && second == "show"));
    }

    #[test]
    fn parameter_renamed_at_same_position_is_rejected() {
        for endpoint in ["/:name", "/:name/feed"] {
            let table = ActionTable::new()
                .action("get", ActionSpecInput::new())
                .action("rename", ActionSpecInput::new().method(HttpMethod::Post).endpoint(endpoint));
            let err = compile("pets", &table, &RouteOptions::new()).unwrap_err();
            assert!(matches!(err, CompileError::ConflictingParameter { ref first, ref second, ref other, .. }
                if first == "get" && second == "rename" && other == "/pets/:id"), "{}", err);
        }
    }

    #[test]
    fn same_parameter_name_or_literal_sibling_is_accepted() {
        let table = ActionTable::new()
            .action("get", ActionSpecInput::new())
            .action("feed", ActionSpecInput::new().method(HttpMethod::Post).endpoint("/:id/feed"))
            .action("search", ActionSpecInput::new().method(HttpMethod::Get).endpoint("/search"));
        assert!(compile("pets", &table, &RouteOptions::new()).is_ok());
        assert!(!param_names_differ("/pets/search", "/pets/:name"));
        assert!(!param_names_differ("/owners/:name", "/pets/:id"));
    }

    #[test]
    fn middleware_for_undeclared_action_is_rejected() {
        struct Noop;
        #[async_trait::async_trait]
        impl crate::routes::Middleware for Noop {
            async fn handle(&self, _: &mut crate::RequestContext) -> Result<crate::routes::Flow, crate::AppError> {
                Ok(crate::routes::Flow::Next)
            }
        }
        let table = ActionTable::new()
            .action("get", ActionSpecInput::new())
            .middleware("gte", std::sync::Arc::new(Noop));
        let err = compile("pets", &table, &RouteOptions::new()).unwrap_err();
        assert!(matches!(err, CompileError::InvalidOptions { ref path, .. } if path == "pets.gte"), "{}", err);
    }

    #[test]
    fn compiling_twice_is_identical() {
        let table = ActionTable::new()
            .action("update", get_with_integer_id().protected())
            .action("index", ActionSpecInput::new())
            .action("get", get_with_integer_id());
        let options = RouteOptions::new()
            .with_body_parsing(true)
            .with_signing_secret("foo-bar")
            .with_acl(Acl::fixed(crate::acl::StaticPolicy::new()));
        let a = compile("pets", &table, &options).unwrap();
        let b = compile("pets", &table, &options).unwrap();
        assert_eq!(a.endpoints(), b.endpoints());
        let kinds = |r: &CompiledRoute| r.actions().iter().map(CompiledAction::stage_kinds).collect::<Vec<_>>();
        assert_eq!(kinds(&a), kinds(&b));
        assert_eq!(
            a.action("update").unwrap().stage_kinds(),
            vec![
                StageKind::Authenticate,
                StageKind::Authorize,
                StageKind::ParseBody,
                StageKind::Validate,
            ]
        );
    }
}
