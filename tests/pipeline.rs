//! End-to-end tests of compiled routes driven through the axum router.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::ServiceExt;

use routekit::{
    compile, created, success_one, Acl, ActionTable, AppError, Flow, Middleware, RequestContext, Resource,
    RouteOptions, StaticPolicy,
};

const SECRET: &str = "foo-bar";

// =============================================================================
// In-memory resource
// =============================================================================

#[derive(Default)]
struct Pets {
    pets: Mutex<Vec<Value>>,
}

#[async_trait]
impl Resource for Pets {
    async fn create(&self, ctx: RequestContext) -> Result<Response, AppError> {
        let mut pets = self.pets.lock().await;
        let mut pet = ctx.body;
        pet["id"] = json!(pets.len() + 1);
        pets.push(pet.clone());
        Ok(created(pet))
    }

    async fn get(&self, ctx: RequestContext) -> Result<Response, AppError> {
        let role = ctx.claims.as_ref().and_then(|c| c.role.clone());
        Ok(success_one(json!({ "id": ctx.param("id"), "role": role })))
    }

    async fn custom(&self, action: &str, ctx: RequestContext) -> Result<Response, AppError> {
        match action {
            "feed" => Ok(success_one(json!({ "fed": ctx.param("id") }))),
            other => Err(AppError::NotImplemented(other.to_string())),
        }
    }
}

/// Halts with 418 unless an `x-api-key` header is present.
struct RequireApiKey;

#[async_trait]
impl Middleware for RequireApiKey {
    fn name(&self) -> &str {
        "require-api-key"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow, AppError> {
        if ctx.header("x-api-key").is_some() {
            Ok(Flow::Next)
        } else {
            Ok(Flow::Halt(StatusCode::IM_A_TEAPOT.into_response()))
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn pets_table() -> ActionTable {
    ActionTable::from_value(&json!({
        "create": {
            "validation": {
                "body": {
                    "name": { "type": "string", "required": true, "minLength": 1 },
                    "age": { "type": "integer", "minimum": 0 }
                }
            },
            "bodyParsingOptions": { "limit": 64 }
        },
        "get": {
            "validation": { "params": { "id": { "type": "integer", "required": true } } }
        },
        "delete": {},
        "feed": { "method": "POST", "endpoint": "/:id/feed" }
    }))
    .unwrap()
}

fn app(table: ActionTable, options: RouteOptions) -> Router {
    compile("pets", &table, &options)
        .unwrap()
        .into_router(Arc::new(Pets::default()))
}

fn token(role: &str) -> String {
    encode(
        &Header::default(),
        &json!({ "sub": "u1", "role": role }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn request(method: &str, uri: &str, body: Option<Value>, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn create_parses_and_validates_body() {
    let app = app(pets_table(), RouteOptions::new().with_body_parsing(true));

    let (status, body) = send(&app, request("POST", "/pets", Some(json!({ "name": "rex", "age": 3 })), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"], json!({ "name": "rex", "age": 3, "id": 1 }));

    let (status, body) = send(&app, request("POST", "/pets", Some(json!({ "age": 3 })), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["details"], json!({ "section": "body", "field": "name" }));

    let (status, _) = send(&app, request("POST", "/pets", Some(json!({ "name": "rex", "owner": "me" })), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_coerces_integer_id() {
    let app = app(pets_table(), RouteOptions::new());

    let (status, body) = send(&app, request("GET", "/pets/42", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], json!(42));

    let (status, body) = send(&app, request("GET", "/pets/abc", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["section"], "params");
}

#[tokio::test]
async fn custom_action_has_no_default_validation() {
    let app = app(pets_table(), RouteOptions::new());
    let (status, body) = send(&app, request("POST", "/pets/abc/feed", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fed"], "abc");
}

#[tokio::test]
async fn declared_but_unimplemented_action_is_501() {
    let app = app(pets_table(), RouteOptions::new());
    let (status, body) = send(&app, request("DELETE", "/pets/1", None, None)).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["error"]["code"], "not_implemented");
}

#[tokio::test]
async fn undeclared_method_is_rejected_by_router() {
    let app = app(pets_table(), RouteOptions::new());
    let (status, _) = send(&app, request("PUT", "/pets/1", Some(json!({})), None)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn authentication_runs_before_validation() {
    let table = ActionTable::from_value(&json!({
        "create": {
            "isProtected": true,
            "validation": { "body": { "name": { "type": "string", "required": true } } }
        }
    }))
    .unwrap();
    let app = app(table, RouteOptions::new().with_body_parsing(true).with_signing_secret(SECRET));

    // invalid body, no token: the 401 wins
    let (status, body) = send(&app, request("POST", "/pets", Some(json!({})), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _) = send(&app, request("POST", "/pets", Some(json!({})), Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, request("POST", "/pets", Some(json!({})), Some(&token("user")))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, request("POST", "/pets", Some(json!({ "name": "rex" })), Some(&token("user")))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn acl_refusal_halts_with_403() {
    let table = ActionTable::from_value(&json!({ "get": { "isProtected": true } })).unwrap();
    let acl = Acl::fixed(StaticPolicy::new().allow("admin", "/pets*", "GET"));
    let app = app(table, RouteOptions::new().with_signing_secret(SECRET).with_acl(acl));

    let (status, body) = send(&app, request("GET", "/pets/7", None, Some(&token("user")))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");

    let (status, body) = send(&app, request("GET", "/pets/7", None, Some(&token("admin")))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "id": "7", "role": "admin" }));
}

#[tokio::test]
async fn custom_stage_can_halt_the_chain() {
    let table = pets_table().middleware("feed", Arc::new(RequireApiKey));
    let app = app(table, RouteOptions::new());

    let (status, _) = send(&app, request("POST", "/pets/1/feed", None, None)).await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);

    let req = Request::builder()
        .method("POST")
        .uri("/pets/1/feed")
        .header("x-api-key", "k")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn oversized_body_is_413() {
    let app = app(pets_table(), RouteOptions::new().with_body_parsing(true));
    let name = "x".repeat(200);
    let (status, body) = send(&app, request("POST", "/pets", Some(json!({ "name": name })), None)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], "payload_too_large");
}

#[tokio::test]
async fn non_json_body_is_415() {
    let app = app(pets_table(), RouteOptions::new().with_body_parsing(true));
    let req = Request::builder()
        .method("POST")
        .uri("/pets")
        .header(header::CONTENT_TYPE, "application/xml")
        .body(Body::from("<pet/>"))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}
