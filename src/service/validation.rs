//! Request validation from declared field rules.
//!
//! This is the schema adapter used by the validation stage: it checks one section of a
//! request (body, params or query) against an [`ObjectSchema`] and returns the coerced
//! value (string inputs converted to the declared type, defaults filled in).

use crate::config::{type_name_of_json, FieldRule, FieldType, ObjectSchema, ValidationSpec};
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Body,
    Params,
    Query,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Body => "body",
            Section::Params => "params",
            Section::Query => "query",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{section}.{field} {message}")]
pub struct ValidationError {
    pub section: Section,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(section: Section, field: &str, message: impl Into<String>) -> Self {
        ValidationError {
            section,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Coerced request sections returned by [`RequestValidator::validate_request`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub body: Value,
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
}

pub struct RequestValidator;

impl RequestValidator {
    /// Validate one section. `Null` input is treated as an empty object; keys that the
    /// schema does not list are rejected.
    pub fn validate(section: Section, input: &Value, schema: &ObjectSchema) -> Result<Value, ValidationError> {
        let empty = Map::new();
        let obj = match input {
            Value::Object(m) => m,
            Value::Null => &empty,
            other => {
                return Err(ValidationError::new(
                    section,
                    "",
                    format!("must be an object, got {}", type_name_of_json(other)),
                ))
            }
        };

        if let Some(unknown) = obj.keys().find(|k| !schema.contains_key(*k)) {
            return Err(ValidationError::new(section, unknown, "is not allowed"));
        }

        let mut out = Map::new();
        for (field, rule) in schema {
            match obj.get(field) {
                None | Some(Value::Null) if rule.default.is_some() => {
                    if let Some(default) = &rule.default {
                        out.insert(field.clone(), default.clone());
                    }
                }
                None | Some(Value::Null) if rule.required == Some(true) => {
                    return Err(ValidationError::new(section, field, "is required"));
                }
                None => {}
                Some(Value::Null) => {
                    out.insert(field.clone(), Value::Null);
                }
                Some(v) => {
                    let coerced = coerce(section, field, v, rule)?;
                    validate_field(section, field, &coerced, rule)?;
                    out.insert(field.clone(), coerced);
                }
            }
        }
        Ok(Value::Object(out))
    }

    /// Validate every section with a declared schema. Sections without a schema pass through
    /// unchanged.
    pub fn validate_request(
        spec: &ValidationSpec,
        body: &Value,
        params: &Map<String, Value>,
        query: &Map<String, Value>,
    ) -> Result<ValidatedRequest, ValidationError> {
        let body = match &spec.body {
            Some(schema) => Self::validate(Section::Body, body, schema)?,
            None => body.clone(),
        };
        let params = match &spec.params {
            Some(schema) => into_map(Self::validate(Section::Params, &Value::Object(params.clone()), schema)?),
            None => params.clone(),
        };
        let query = match &spec.query {
            Some(schema) => into_map(Self::validate(Section::Query, &Value::Object(query.clone()), schema)?),
            None => query.clone(),
        };
        Ok(ValidatedRequest { body, params, query })
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

fn coerce(section: Section, field: &str, v: &Value, rule: &FieldRule) -> Result<Value, ValidationError> {
    let Some(kind) = rule.kind else {
        return Ok(v.clone());
    };
    let fail = |expected: &str| {
        ValidationError::new(
            section,
            field,
            format!("must be {}, got {}", expected, type_name_of_json(v)),
        )
    };
    match (kind, v) {
        (FieldType::Any, _) => Ok(v.clone()),
        (FieldType::String, Value::String(_)) => Ok(v.clone()),
        (FieldType::Integer, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Ok(v.clone())
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Value::Number((f as i64).into())),
                    _ => Err(fail("an integer")),
                }
            }
        }
        (FieldType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| fail("an integer")),
        (FieldType::Number, Value::Number(_)) => Ok(v.clone()),
        (FieldType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| fail("a number")),
        (FieldType::Boolean, Value::Bool(_)) => Ok(v.clone()),
        (FieldType::Boolean, Value::String(s)) => match s.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(fail("a boolean")),
        },
        (FieldType::Object, Value::Object(_)) => Ok(v.clone()),
        (FieldType::Array, Value::Array(_)) => Ok(v.clone()),
        (FieldType::String, _) => Err(fail("a string")),
        (FieldType::Integer, _) => Err(fail("an integer")),
        (FieldType::Number, _) => Err(fail("a number")),
        (FieldType::Boolean, _) => Err(fail("a boolean")),
        (FieldType::Object, _) => Err(fail("an object")),
        (FieldType::Array, _) => Err(fail("an array")),
    }
}

fn validate_field(section: Section, col: &str, v: &Value, rule: &FieldRule) -> Result<(), ValidationError> {
    let err = |message: String| ValidationError::new(section, col, message);
    if let Some(format) = &rule.format {
        validate_format(section, col, v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(err(format!("must be at most {} characters", max)));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(err(format!("must be at least {} characters", min)));
            }
        }
        if let Some(pattern) = &rule.pattern {
            let re = Regex::new(pattern).map_err(|_| err("has an invalid pattern".into()))?;
            if !re.is_match(s) {
                return Err(err("does not match required pattern".into()));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(err(format!(
                "must be one of: {:?}",
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(err(format!("must be at least {}", min)));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(err(format!("must be at most {}", max)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(section: Section, col: &str, v: &Value, format: &str) -> Result<(), ValidationError> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    match format.to_lowercase().as_str() {
        "email" if !is_valid_email(s) => Err(ValidationError::new(section, col, "must be a valid email")),
        "uuid" if uuid::Uuid::parse_str(s).is_err() => {
            Err(ValidationError::new(section, col, "must be a valid UUID"))
        }
        "uri" if url::Url::parse(s).is_err() => Err(ValidationError::new(section, col, "must be a valid URI")),
        _ => Ok(()),
    }
}

/// Syntactic address check (`local@domain.tld`), shared with the mail facade.
pub fn is_valid_email(s: &str) -> bool {
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !s.chars().any(|c| c.is_whitespace() || c == '<' || c == '>')
        && domain.contains('.')
        && domain
            .split('.')
            .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(fields: &[(&str, FieldRule)]) -> ObjectSchema {
        fields.iter().map(|(k, r)| (k.to_string(), r.clone())).collect()
    }

    #[test]
    fn path_param_is_coerced_to_integer() {
        let s = schema(&[("id", FieldRule::of(FieldType::Integer).required())]);
        let out = RequestValidator::validate(Section::Params, &json!({ "id": "42" }), &s).unwrap();
        assert_eq!(out, json!({ "id": 42 }));
    }

    #[test]
    fn non_numeric_id_is_rejected() {
        let s = schema(&[("id", FieldRule::of(FieldType::Integer).required())]);
        let err = RequestValidator::validate(Section::Params, &json!({ "id": "abc" }), &s).unwrap_err();
        assert_eq!(err.field, "id");
        assert_eq!(err.section, Section::Params);
        assert_eq!(err.to_string(), "params.id must be an integer, got string");
    }

    #[test]
    fn missing_required_field() {
        let s = schema(&[("name", FieldRule::of(FieldType::String).required())]);
        let err = RequestValidator::validate(Section::Body, &Value::Null, &s).unwrap_err();
        assert_eq!(err.to_string(), "body.name is required");
    }

    #[test]
    fn defaults_are_filled_in() {
        let s = schema(&[("limit", FieldRule::of(FieldType::Integer).with_default(json!(20)))]);
        let out = RequestValidator::validate(Section::Query, &json!({}), &s).unwrap();
        assert_eq!(out, json!({ "limit": 20 }));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let s = schema(&[("name", FieldRule::of(FieldType::String))]);
        let err = RequestValidator::validate(Section::Body, &json!({ "name": "rex", "age": 3 }), &s).unwrap_err();
        assert_eq!(err.field, "age");
        assert_eq!(err.message, "is not allowed");
    }

    #[test]
    fn string_rules_apply() {
        let mut rule = FieldRule::of(FieldType::String);
        rule.min_length = Some(3);
        rule.pattern = Some("^[a-z]+$".into());
        let s = schema(&[("name", rule)]);
        assert!(RequestValidator::validate(Section::Body, &json!({ "name": "ab" }), &s).is_err());
        assert!(RequestValidator::validate(Section::Body, &json!({ "name": "ABC" }), &s).is_err());
        assert!(RequestValidator::validate(Section::Body, &json!({ "name": "abc" }), &s).is_ok());
    }

    #[test]
    fn allowed_values_and_bounds() {
        let mut rule = FieldRule::of(FieldType::Number);
        rule.minimum = Some(0.0);
        rule.maximum = Some(10.0);
        rule.allowed = Some(vec![json!(1), json!(2.5)]);
        let s = schema(&[("score", rule)]);
        assert!(RequestValidator::validate(Section::Body, &json!({ "score": "2.5" }), &s).is_ok());
        assert!(RequestValidator::validate(Section::Body, &json!({ "score": 3 }), &s).is_err());
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("a@test.com"));
        assert!(!is_valid_email("a@"));
        assert!(!is_valid_email("not-an-email"));
    }

    #[test]
    fn validate_request_passes_undeclared_sections_through() {
        let spec = ValidationSpec {
            params: Some(schema(&[("id", FieldRule::of(FieldType::Integer).required())])),
            ..Default::default()
        };
        let mut params = Map::new();
        params.insert("id".into(), json!("7"));
        let mut query = Map::new();
        query.insert("q".into(), json!("x"));
        let out = RequestValidator::validate_request(&spec, &json!({ "free": true }), &params, &query).unwrap();
        assert_eq!(out.params["id"], json!(7));
        assert_eq!(out.query["q"], json!("x"));
        assert_eq!(out.body, json!({ "free": true }));
    }
}
