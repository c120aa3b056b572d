// File-manager API handlers under /api
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use log::info;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::access::middleware::require_access;
use crate::app_state::AppState;
use crate::error::VfsError;
use crate::api::payload::{pump_payload, ChannelReader, UPLOAD_QUEUE_DEPTH};
use crate::logging::with_request_tags;
use crate::service::transfer::TransferReport;
use crate::service::walker::as_dir_prefix;

const DEFAULT_USAGE_LIMIT: usize = 10;
const MAX_USAGE_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct PrefixQuery {
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub directory: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MkdirRequest {
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub key: Option<String>,
    #[serde(default, rename = "isDir")]
    pub is_dir: bool,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(default, rename = "isDir")]
    pub is_dir: bool,
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FileUsageQuery {
    pub key: Option<String>,
}

fn entry_kind(is_dir: bool) -> &'static str {
    if is_dir {
        "directory"
    } else {
        "file"
    }
}

/// 200 with `body` when every step landed, otherwise 500 carrying the report
fn transfer_response(report: TransferReport, body: serde_json::Value) -> HttpResponse {
    if report.is_complete() {
        return HttpResponse::Ok().json(body);
    }

    let attempted = report.applied.len() + report.missing.len() + report.failed.len();
    HttpResponse::InternalServerError().json(json!({
        "error": format!("{} of {} entries failed", report.failed.len(), attempted),
        "report": report,
    }))
}

/// GET /api/list?prefix=
pub async fn list_handler(
    req: HttpRequest,
    query: web::Query<PrefixQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, VfsError> {
    require_access(&req, app_state.gate.as_ref())?;
    let prefix = query.into_inner().prefix;

    let files = app_state.file_service.clone();
    let level =
        web::block(move || with_request_tags("list", &prefix, || files.list_level(&prefix))).await??;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "files": level.files,
        "directories": level.sub_prefixes,
    })))
}

/// GET /api/tree?prefix=
pub async fn tree_handler(
    req: HttpRequest,
    query: web::Query<PrefixQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, VfsError> {
    require_access(&req, app_state.gate.as_ref())?;
    let prefix = query.into_inner().prefix;

    let files = app_state.file_service.clone();
    let tree = web::block(move || with_request_tags("tree", &prefix, || files.walk(&prefix))).await??;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "files": tree.files,
        "directories": tree.directories,
    })))
}

/// POST /api/upload?directory=&name= with the file as the raw body.
/// The body is streamed into the store as it arrives.
pub async fn upload_handler(
    req: HttpRequest,
    query: web::Query<UploadQuery>,
    payload: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, VfsError> {
    require_access(&req, app_state.gate.as_ref())?;
    let UploadQuery { directory, name } = query.into_inner();
    let name = name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| VfsError::validation("No file"))?;

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    let (sender, receiver) = mpsc::channel(UPLOAD_QUEUE_DEPTH);
    let files = app_state.file_service.clone();
    let stored = web::block(move || {
        with_request_tags("upload", &name, || {
            files.upload(
                directory.as_deref(),
                &name,
                &mut ChannelReader::new(receiver),
                content_type.as_deref(),
            )
        })
    });

    let pump = pump_payload(payload, sender, app_state.config.server.max_payload_size);
    let (pumped, stored) = futures::join!(pump, stored);
    // a rejected payload explains the failed store write better than the store does
    pumped?;
    let info = stored??;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "key": info.key,
        "size": info.size,
    })))
}

/// POST /api/mkdir {directory}
pub async fn mkdir_handler(
    req: HttpRequest,
    body: web::Json<MkdirRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, VfsError> {
    require_access(&req, app_state.gate.as_ref())?;
    let directory = body
        .into_inner()
        .directory
        .ok_or_else(|| VfsError::validation("No directory"))?;

    let files = app_state.file_service.clone();
    let placeholder =
        web::block(move || with_request_tags("mkdir", &directory, || files.mkdir(&directory))).await??;
    let directory = placeholder
        .rsplit_once('/')
        .map(|(dir, _)| format!("{}/", dir))
        .unwrap_or_default();

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "directory": directory,
    })))
}

/// POST /api/delete {key, isDir}
pub async fn delete_handler(
    req: HttpRequest,
    body: web::Json<DeleteRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, VfsError> {
    require_access(&req, app_state.gate.as_ref())?;
    let DeleteRequest { key, is_dir } = body.into_inner();
    let key = key.ok_or_else(|| VfsError::validation("No key"))?;

    let files = app_state.file_service.clone();
    let report =
        web::block(move || with_request_tags("delete", &key, || files.delete(&key, is_dir))).await??;
    info!("Delete {} finished: {} removed", report.from, report.applied.len());

    let body = if is_dir {
        json!({
            "success": true,
            "deleted": entry_kind(true),
            "prefix": as_dir_prefix(&report.from),
            "count": report.applied.len(),
        })
    } else {
        json!({
            "success": true,
            "deleted": entry_kind(false),
            "key": report.from,
        })
    };
    Ok(transfer_response(report, body))
}

/// POST /api/move {from, to, isDir}
pub async fn move_handler(
    req: HttpRequest,
    body: web::Json<MoveRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, VfsError> {
    require_access(&req, app_state.gate.as_ref())?;
    relocate(body.into_inner(), app_state, false).await
}

/// POST /api/rename {from, to, isDir}
pub async fn rename_handler(
    req: HttpRequest,
    body: web::Json<MoveRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, VfsError> {
    require_access(&req, app_state.gate.as_ref())?;
    relocate(body.into_inner(), app_state, true).await
}

async fn relocate(
    request: MoveRequest,
    app_state: web::Data<AppState>,
    rename: bool,
) -> Result<HttpResponse, VfsError> {
    let MoveRequest { from, to, is_dir } = request;
    let (from, to) = match (from, to) {
        (Some(from), Some(to)) => (from, to),
        _ => return Err(VfsError::validation("Missing from/to")),
    };
    let op = if rename { "rename" } else { "move" };

    let files = app_state.file_service.clone();
    let report = web::block(move || {
        with_request_tags(op, &from, || {
            if rename {
                files.rename(&from, &to, is_dir)
            } else {
                files.move_entry(&from, &to, is_dir)
            }
        })
    })
    .await??;

    let body = json!({
        "success": true,
        (if rename { "renamed" } else { "moved" }): entry_kind(is_dir),
        "from": report.from,
        "to": report.to,
        "count": report.applied.len(),
    });
    Ok(transfer_response(report, body))
}

/// GET /api/usage?limit=
pub async fn usage_handler(
    req: HttpRequest,
    query: web::Query<UsageQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, VfsError> {
    require_access(&req, app_state.gate.as_ref())?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_USAGE_LIMIT)
        .clamp(1, MAX_USAGE_LIMIT);

    let usage = app_state.usage_store.clone();
    let (total, top_files, recent) = web::block(move || {
        with_request_tags("usage", "", || {
            Ok::<_, VfsError>((usage.total_hits()?, usage.top_files(limit)?, usage.recent(limit)?))
        })
    })
    .await??;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "total": total,
        "top_files": top_files,
        "recent": recent,
    })))
}

/// GET /api/usage/file?key=
pub async fn file_usage_handler(
    req: HttpRequest,
    query: web::Query<FileUsageQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, VfsError> {
    require_access(&req, app_state.gate.as_ref())?;
    let key = query
        .into_inner()
        .key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| VfsError::validation("No key"))?;

    let usage = app_state.usage_store.clone();
    let file = key.clone();
    let records =
        web::block(move || with_request_tags("usage", &file, || usage.file_usage(&file))).await??;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "file": key,
        "records": records,
    })))
}

/// Unknown /api route
pub async fn api_not_found(req: HttpRequest) -> Result<HttpResponse, VfsError> {
    Err(VfsError::not_found(format!("Not Found: {}", req.path())))
}
