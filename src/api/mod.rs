//! HTTP routes

pub mod cdn;
pub mod handlers;
pub mod payload;

use actix_web::http::Method;
use actix_web::middleware::DefaultHeaders;
use actix_web::web;

use crate::error::VfsError;

/// Permissive CORS headers added to every response
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Methods", "GET, POST, OPTIONS"))
        .add(("Access-Control-Allow-Headers", "Content-Type"))
}

/// Register every route. Order matters: preflight first, the API scope
/// before the catch-all blob route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| VfsError::validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| VfsError::validation(err.to_string()).into()),
    )
    .route("/{tail:.*}", web::method(Method::OPTIONS).to(cdn::preflight_handler))
    .service(
        web::scope("/api")
            .route("/list", web::get().to(handlers::list_handler))
            .route("/tree", web::get().to(handlers::tree_handler))
            .route("/upload", web::post().to(handlers::upload_handler))
            .route("/mkdir", web::post().to(handlers::mkdir_handler))
            .route("/delete", web::post().to(handlers::delete_handler))
            .route("/move", web::post().to(handlers::move_handler))
            .route("/rename", web::post().to(handlers::rename_handler))
            .route("/usage", web::get().to(handlers::usage_handler))
            .route("/usage/file", web::get().to(handlers::file_usage_handler))
            .default_service(web::to(handlers::api_not_found)),
    )
    .route("/config", web::get().to(cdn::config_handler))
    .route("/", web::get().to(cdn::root_handler))
    .route("/{key:.*}", web::get().to(cdn::serve_handler));
}
