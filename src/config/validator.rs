//! Action table validation: closed shape, defaults for standard actions, explicit
//! method/endpoint for custom ones, and well-formed validation rules.

use crate::config::{ActionName, ActionSpec, ActionSpecInput, ObjectSchema, ValidationSpec};
use crate::error::CompileError;
use regex::Regex;
use std::sync::Arc;

/// Trims surrounding slashes; `"/pets/"` and `"pets"` name the same resource.
pub fn normalize_resource_name(name: &str) -> Result<String, CompileError> {
    let trimmed = name.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(CompileError::invalid("name", "resource name must not be empty"));
    }
    if trimmed.contains(char::is_whitespace) {
        return Err(CompileError::invalid("name", "resource name must not contain whitespace"));
    }
    Ok(trimmed.to_string())
}

pub fn validate_action(resource: &str, name: &str, input: &ActionSpecInput) -> Result<ActionSpec, CompileError> {
    let path = format!("{}.{}", resource, name);
    if name.is_empty() {
        return Err(CompileError::invalid(path, "action name must not be empty"));
    }
    let action = ActionName::parse(name);

    let (method, endpoint) = match action.defaults() {
        Some((default_method, default_endpoint)) => (
            input.method.unwrap_or(default_method),
            input.endpoint.clone().unwrap_or_else(|| default_endpoint.to_string()),
        ),
        None => {
            let method = input
                .method
                .ok_or_else(|| CompileError::invalid(format!("{}.method", path), "custom action requires a method"))?;
            let endpoint = input
                .endpoint
                .clone()
                .ok_or_else(|| CompileError::invalid(format!("{}.endpoint", path), "custom action requires an endpoint"))?;
            (method, endpoint)
        }
    };
    validate_endpoint(&path, &endpoint)?;

    let validation = match &input.validation {
        Some(spec) if !spec.is_empty() => {
            validate_rules(&format!("{}.validation", path), spec)?;
            Some(Arc::new(spec.clone()))
        }
        _ => None,
    };

    Ok(ActionSpec {
        name: action,
        method,
        endpoint,
        validation,
        is_protected: input.is_protected,
        middlewares: input.middlewares.clone(),
        body_parsing: input.body_parsing_options.clone().unwrap_or_default(),
    })
}

fn validate_endpoint(path: &str, endpoint: &str) -> Result<(), CompileError> {
    if endpoint.is_empty() {
        return Ok(());
    }
    if !endpoint.starts_with('/') {
        return Err(CompileError::invalid(
            format!("{}.endpoint", path),
            format!("endpoint must be empty or start with '/', got '{}'", endpoint),
        ));
    }
    for segment in endpoint.split('/').skip(1) {
        if segment.is_empty() && endpoint != "/" {
            return Err(CompileError::invalid(format!("{}.endpoint", path), "endpoint has an empty segment"));
        }
        if segment == ":" {
            return Err(CompileError::invalid(format!("{}.endpoint", path), "path parameter needs a name"));
        }
    }
    Ok(())
}

fn validate_rules(path: &str, spec: &ValidationSpec) -> Result<(), CompileError> {
    let sections: [(&str, &Option<ObjectSchema>); 3] =
        [("body", &spec.body), ("params", &spec.params), ("query", &spec.query)];
    for (section, schema) in sections {
        let Some(schema) = schema else { continue };
        for (field, rule) in schema {
            if let Some(pattern) = &rule.pattern {
                Regex::new(pattern).map_err(|e| {
                    CompileError::invalid(format!("{}.{}.{}.pattern", path, section, field), e.to_string())
                })?;
            }
            if let (Some(min), Some(max)) = (rule.minimum, rule.maximum) {
                if min > max {
                    return Err(CompileError::invalid(
                        format!("{}.{}.{}", path, section, field),
                        "minimum is greater than maximum",
                    ));
                }
            }
        }
    }
    Ok(())
}
