use std::sync::Arc;

use actix_web::{get, web, App, HttpResponse, HttpServer, Responder, Result};
use serde::Serialize;
use tracing::info;

use crate::api;
use crate::api::upload::UploadPolicy;
use crate::config::{BackendKind, Config};
use crate::repository::database::{Database, MemoryStorage, StaticTokens};
use crate::repository::supabase::Supabase;
use crate::repository::Backend;

#[derive(Serialize)]
pub struct Response {
    pub message: String,
}

#[get("/health")]
async fn healthcheck() -> impl Responder {
    let response = Response {
        message: "Everything is working fine".to_string(),
    };
    HttpResponse::Ok().json(response)
}

async fn not_found() -> Result<HttpResponse> {
    let response = Response {
        message: "Resource not found".to_string(),
    };
    Ok(HttpResponse::NotFound().json(response))
}

/// Routes shared by the binary and the tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(api::api::config)
        .service(healthcheck)
        .service(stored_file)
        .default_service(web::route().to(not_found));
}

/// Serves objects of the in-memory store under the URLs it hands out.
#[get("/files/{key:.*}")]
async fn stored_file(
    storage: Option<web::Data<MemoryStorage>>,
    key: web::Path<String>,
) -> Result<HttpResponse> {
    let object = storage.and_then(|storage| storage.object(&key));
    match object {
        Some((content_type, bytes)) => Ok(HttpResponse::Ok().content_type(content_type).body(bytes)),
        None => not_found().await,
    }
}

pub struct Services {
    pub backend: Backend,
    pub upload: UploadPolicy,
    /// Set for the memory backend only.
    pub files: Option<Arc<MemoryStorage>>,
}

pub fn services(config: &Config) -> Services {
    let (backend, files) = match &config.backend {
        BackendKind::Supabase { url, key } => {
            info!(%url, bucket = %config.storage_bucket, "Using Supabase backend");
            let supabase = Arc::new(Supabase::new(url, key, &config.storage_bucket));
            (Backend::new(supabase.clone(), supabase.clone(), supabase), None)
        }
        BackendKind::Memory { tokens } => {
            info!("Using in-memory backend");
            let files = Arc::new(MemoryStorage::new(format!(
                "http://{}:{}/files",
                config.host, config.port
            )));
            let backend = Backend::new(
                Arc::new(Database::new()),
                Arc::new(StaticTokens::parse(tokens)),
                files.clone(),
            );
            (backend, Some(files))
        }
    };
    Services {
        backend,
        upload: UploadPolicy::new(config.max_upload_bytes),
        files,
    }
}

pub async fn run(config: Config) -> std::io::Result<()> {
    let services = services(&config);
    let app_data = web::Data::new(services.backend);
    let upload = web::Data::new(services.upload);
    let files = services.files.map(web::Data::from);

    info!(host = %config.host, port = config.port, "Starting server");
    HttpServer::new(move || {
        let mut app = App::new()
            .app_data(app_data.clone())
            .app_data(upload.clone());
        if let Some(files) = &files {
            app = app.app_data(files.clone());
        }
        app.configure(routes)
            .wrap(actix_web::middleware::Logger::default())
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ObjectStorage;
    use actix_web::http::StatusCode;
    use actix_web::test::{self, TestRequest};

    fn memory_config() -> Config {
        Config::from_lookup(|key: &str| match key {
            "TODO_BACKEND" => Some("memory".to_string()),
            "MEMORY_TOKENS" => Some("t=alice".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[actix_web::test]
    async fn test_healthcheck() {
        let app = test::init_service(App::new().configure(routes)).await;
        let req = TestRequest::default().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(StatusCode::OK, resp.status());
    }

    #[actix_web::test]
    async fn test_unknown_route_is_json_404() {
        let app = test::init_service(App::new().configure(routes)).await;
        let req = TestRequest::default().uri("/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(StatusCode::NOT_FOUND, resp.status());
    }

    #[actix_web::test]
    async fn test_memory_backend_serves_configured_tokens() {
        let services = services(&memory_config());
        assert!(services.files.is_some());
        let data = web::Data::new(services.backend);
        let app = test::init_service(App::new().app_data(data).configure(routes)).await;
        let req = TestRequest::get()
            .uri("/api/todos")
            .insert_header(("Authorization", "Bearer t"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(StatusCode::OK, resp.status());
    }

    #[actix_web::test]
    async fn test_memory_files_are_served() {
        let storage = Arc::new(MemoryStorage::new("http://127.0.0.1:8080/files"));
        storage
            .upload("alice/1-a.png", b"png".to_vec(), "image/png")
            .await
            .unwrap();
        assert_eq!(
            storage.public_url("alice/1-a.png"),
            "http://127.0.0.1:8080/files/alice/1-a.png"
        );
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(storage))
                .configure(routes),
        )
        .await;

        let req = TestRequest::get().uri("/files/alice/1-a.png").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(StatusCode::OK, resp.status());
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"png");

        let req = TestRequest::get().uri("/files/alice/missing.png").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(StatusCode::NOT_FOUND, resp.status());
    }
}
