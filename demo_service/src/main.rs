//! Pet-shop service: an in-memory `pets` resource compiled from `routes.json`, with
//! adoption mails sent through the fake mail backend and photos kept on local disk.
//!
//! Run from repo root: `cargo run -p demo-service`

use async_trait::async_trait;
use axum::response::Response;
use routekit::{
    compile, created, init_tracing, load_route_tables, no_content, success_many, success_one, AppError,
    Mail, MailOptions, MicroService, RequestContext, Resource, RouteOptions, ServiceConfig, Storage,
};
use routekit::config::StaticPath;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

const UPLOAD_DIR: &str = "uploads";

struct Pets {
    pets: RwLock<Vec<Value>>,
    mail: Mail,
    storage: Storage,
}

impl Pets {
    fn find(&self, ctx: &RequestContext) -> impl Future<Output = Result<Value, AppError>> + Send + '_ {
        let id = ctx.param("id").and_then(Value::as_u64);
        async move {
            self.pets
                .read()
                .await
                .iter()
                .find(|p| p["id"].as_u64() == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("pet {:?}", id)))
        }
    }

    async fn adopt(&self, ctx: RequestContext) -> Result<Response, AppError> {
        let pet = self.find(&ctx).await?;
        let to = ctx.body["email"].as_str().unwrap_or_default();
        let message = MailOptions::new(
            "shop@example.com",
            to,
            format!("You adopted {}", pet["name"].as_str().unwrap_or("a pet")),
            "Thank you for giving a pet a home.",
        );
        let info = self.mail.send_mail(message).await?;
        Ok(success_one(json!({ "pet": pet, "mail": info })))
    }

    async fn photo(&self, ctx: RequestContext) -> Result<Response, AppError> {
        let pet = self.find(&ctx).await?;
        let filename = ctx.body["filename"].as_str().unwrap_or_default();
        let content = ctx.body["content"].as_str().unwrap_or_default().as_bytes().to_vec();
        let scope = format!("pets/{}", pet["id"]);
        let file = self.storage.upload(content, filename, Some(&scope)).await?;
        Ok(created(file))
    }
}

#[async_trait]
impl Resource for Pets {
    async fn create(&self, ctx: RequestContext) -> Result<Response, AppError> {
        let mut pets = self.pets.write().await;
        let mut pet = ctx.body;
        let id = pets.iter().filter_map(|p| p["id"].as_u64()).max().unwrap_or(0) + 1;
        pet["id"] = json!(id);
        pets.push(pet.clone());
        tracing::info!(id, "pet created");
        Ok(created(pet))
    }

    async fn index(&self, ctx: RequestContext) -> Result<Response, AppError> {
        let species = ctx.query.get("species").and_then(Value::as_str);
        let pets: Vec<Value> = self
            .pets
            .read()
            .await
            .iter()
            .filter(|p| species.map_or(true, |s| p["species"] == s))
            .cloned()
            .collect();
        Ok(success_many(pets))
    }

    async fn get(&self, ctx: RequestContext) -> Result<Response, AppError> {
        Ok(success_one(self.find(&ctx).await?))
    }

    async fn delete(&self, ctx: RequestContext) -> Result<Response, AppError> {
        let pet = self.find(&ctx).await?;
        self.pets.write().await.retain(|p| p["id"] != pet["id"]);
        Ok(no_content())
    }

    async fn custom(&self, action: &str, ctx: RequestContext) -> Result<Response, AppError> {
        match action {
            "adopt" => self.adopt(ctx).await,
            "photo" => self.photo(ctx).await,
            other => Err(AppError::NotImplemented(other.to_string())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("routekit=info,demo_service=info,tower_http=info");

    let mut config = ServiceConfig::from_env()?;
    config.static_paths.push(StaticPath {
        url: "/static".into(),
        path: UPLOAD_DIR.into(),
    });

    let mut mail = Mail::default();
    mail.use_provider("FAKE_MAIL", Value::Null).await?;
    let mut storage = Storage::default();
    storage
        .use_provider(
            "FS",
            json!({ "dist": UPLOAD_DIR, "url": format!("http://localhost:{}/static", config.port) }),
        )
        .await?;

    let routes_path = std::env::var("ROUTES_PATH").unwrap_or_else(|_| "demo_service/routes.json".into());
    let tables = load_route_tables(&routes_path).await?;
    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set, using an insecure development secret");
        "dev-secret".into()
    });
    let options = RouteOptions::new().with_body_parsing(true).with_signing_secret(secret);

    let mut service = MicroService::new(config);
    if let Some(table) = tables.get("pets") {
        let route = compile("pets", table, &options)?;
        let pets = Arc::new(Pets {
            pets: RwLock::new(Vec::new()),
            mail,
            storage,
        });
        service = service.add_route(route, pets);
    }
    service.start().await?;
    Ok(())
}
