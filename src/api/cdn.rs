//! Public side of the server: blob serving, the root document and the
//! front-end config echo.

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use bytes::Bytes;
use futures::Stream;
use log::{debug, error, warn};
use serde_json::json;
use std::io::{self, Read};

use crate::app_state::AppState;
use crate::config::SiteConfig;
use crate::error::VfsError;
use crate::logging::with_request_tags;
use crate::storage::BlobBody;

const SERVE_CHUNK_SIZE: usize = 64 * 1024;

/// MIME type by file extension
pub fn guess_content_type(key: &str) -> &'static str {
    let name = key.rsplit('/').next().unwrap_or(key);
    let extension = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return "application/octet-stream",
    };

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "webp" => "image/webp",
        "webm" => "video/webm",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "wasm" => "application/wasm",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

fn site_values(site: &SiteConfig) -> serde_json::Value {
    json!({
        "ENV": site.environment,
        "API_BASE": site.api_base,
        "CDN_BASE": site.cdn_base,
    })
}

/// Insert a `window.CONFIG` script before `</head>`, or append it when the
/// document has no head
pub fn inject_site_config(document: &str, site: &SiteConfig) -> String {
    let script = format!("<script>window.CONFIG = {}</script>", site_values(site));
    match document.find("</head>") {
        Some(pos) => format!("{}{}{}", &document[..pos], script, &document[pos..]),
        None => format!("{}{}", document, script),
    }
}

/// Read a blob body in chunks on the blocking pool
fn body_stream(body: BlobBody) -> impl Stream<Item = Result<Bytes, io::Error>> {
    futures::stream::unfold(Some(body), |state| async move {
        let mut reader = match state {
            Some(reader) => reader,
            None => return None,
        };
        let chunk = web::block(move || {
            let mut buf = vec![0u8; SERVE_CHUNK_SIZE];
            let n = reader.read(&mut buf)?;
            buf.truncate(n);
            Ok::<_, io::Error>((reader, buf))
        })
        .await;

        match chunk {
            Ok(Ok((_, buf))) if buf.is_empty() => None,
            Ok(Ok((reader, buf))) => Some((Ok(Bytes::from(buf)), Some(reader))),
            Ok(Err(e)) => {
                error!("Error reading blob body: {}", e);
                Some((Err(e), None))
            }
            Err(e) => Some((Err(io::Error::new(io::ErrorKind::Other, e.to_string())), None)),
        }
    })
}

/// CORS preflight
pub async fn preflight_handler() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

pub async fn config_handler(app_state: web::Data<AppState>) -> HttpResponse {
    let mut body = site_values(&app_state.config.site);
    body["success"] = json!(true);
    HttpResponse::Ok().json(body)
}

/// GET / : the root document with the site config injected
pub async fn root_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, VfsError> {
    let files = app_state.file_service.clone();
    let index_key = app_state.config.site.index_document.clone();

    let lookup_key = index_key.clone();
    let document = web::block(move || {
        with_request_tags("root", &lookup_key, || files.read_document(&lookup_key))
    })
    .await??;
    match document {
        Some(document) => Ok(HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(inject_site_config(&document, &app_state.config.site))),
        None => {
            error!("Root document {} missing from store", index_key);
            Ok(HttpResponse::InternalServerError()
                .content_type("text/plain; charset=utf-8")
                .body(format!("{} missing", index_key)))
        }
    }
}

/// GET /{key} : stream a stored blob
pub async fn serve_handler(
    req: HttpRequest,
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, VfsError> {
    let key = path.into_inner().trim_start_matches('/').to_string();
    if key.is_empty() {
        return Ok(HttpResponse::NotFound().body("Not Found"));
    }

    let files = app_state.file_service.clone();
    let lookup_key = key.clone();
    let object = match web::block(move || {
        with_request_tags("serve", &lookup_key, || files.open_for_serve(&lookup_key))
    })
    .await? {
        Ok(object) => object,
        Err(VfsError::Forbidden(_)) => {
            warn!("Refused to serve blocked key {}", key);
            return Ok(HttpResponse::Forbidden().body("Forbidden"));
        }
        Err(VfsError::NotFound(_)) => {
            debug!("No object at {}", key);
            return Ok(HttpResponse::NotFound().body("Not Found"));
        }
        Err(e) => return Err(e),
    };

    let referrer = req
        .headers()
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok());
    app_state.telemetry.record_serve(&key, referrer);

    let etag = object.info.etag.as_ref().map(|etag| format!("\"{}\"", etag));
    let cache_control = app_state.config.site.cache_control.clone();

    if let Some(etag) = &etag {
        let if_none_match = req
            .headers()
            .get(header::IF_NONE_MATCH)
            .and_then(|value| value.to_str().ok());
        if if_none_match == Some(etag.as_str()) {
            return Ok(HttpResponse::NotModified()
                .insert_header((header::ETAG, etag.clone()))
                .insert_header((header::CACHE_CONTROL, cache_control))
                .finish());
        }
    }

    let content_type = object
        .info
        .content_type
        .clone()
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| guess_content_type(&key).to_string());

    let mut response = HttpResponse::Ok();
    response
        .insert_header((header::CONTENT_TYPE, content_type))
        .insert_header((header::CACHE_CONTROL, cache_control));
    if let Some(etag) = etag {
        response.insert_header((header::ETAG, etag));
    }
    Ok(response.streaming(body_stream(object.body)))
}
