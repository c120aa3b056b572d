use actix_web::{http::StatusCode, test, web, App};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use flat_drive::api::{configure, cors_headers};
use flat_drive::app_state::AppState;
use flat_drive::config::AppConfig;
use flat_drive::storage::mock_store::MockBlobStore;
use flat_drive::telemetry::mock_store::MockUsageStore;
use flat_drive::telemetry::UsageStore;

const ACCESS_HEADER: &str = "Cf-Access-Jwt-Assertion";

fn test_state(dev_mode: bool) -> (AppState, Arc<MockBlobStore>, Arc<MockUsageStore>) {
    let mut config = AppConfig::for_testing();
    config.access.dev_mode = dev_mode;
    let blobs = Arc::new(MockBlobStore::new());
    let usage = Arc::new(MockUsageStore::new());
    let (state, _worker) = AppState::with_stores(config, blobs.clone(), usage.clone());
    (state, blobs, usage)
}

macro_rules! init_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .wrap(cors_headers())
                .configure(configure),
        )
        .await
    };
}

async fn wait_for_hits(usage: &MockUsageStore, expected: u64) {
    for _ in 0..200 {
        if usage.total_hits().unwrap() >= expected {
            return;
        }
        actix_web::rt::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("telemetry never reached {} hits", expected);
}

#[actix_web::test]
async fn test_preflight_and_cors_headers() {
    let (state, _, _) = test_state(false);
    let app = init_app!(state);

    let req = test::TestRequest::default()
        .method(actix_web::http::Method::OPTIONS)
        .uri("/api/move")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        resp.headers().get("Access-Control-Allow-Origin").unwrap(),
        "*"
    );
    assert_eq!(
        resp.headers().get("Access-Control-Allow-Methods").unwrap(),
        "GET, POST, OPTIONS"
    );

    let req = test::TestRequest::get().uri("/config").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.headers().get("Access-Control-Allow-Origin").unwrap(), "*");
}

#[actix_web::test]
async fn test_api_requires_access_assertion() {
    let (state, blobs, _) = test_state(false);
    blobs.insert("docs/a.txt", b"a");
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/api/list?prefix=docs").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Unauthorized");

    let req = test::TestRequest::post()
        .uri("/api/delete")
        .set_json(serde_json::json!({"key": "docs/a.txt"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(blobs.contains("docs/a.txt"));

    let req = test::TestRequest::get()
        .uri("/api/list?prefix=docs")
        .insert_header((ACCESS_HEADER, "signed-assertion"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_public_routes_skip_access_check() {
    let (state, blobs, _) = test_state(false);
    blobs.insert("img/logo.png", b"png-bytes");
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/img/logo.png").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_list_and_tree() {
    let (state, blobs, _) = test_state(true);
    blobs.insert("docs/a.txt", b"a");
    blobs.insert("docs/sub/b.txt", b"b");
    blobs.insert("docs/.placeholder", b"");
    blobs.insert("docs/_draft.txt", b"d");
    blobs.insert(".env", b"SECRET");
    blobs.insert("index.html", b"<html></html>");
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/api/list?prefix=docs").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["files"], serde_json::json!(["docs/_draft.txt", "docs/a.txt"]));
    assert_eq!(body["directories"], serde_json::json!(["docs/sub/"]));

    let req = test::TestRequest::get().uri("/api/list").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["files"], serde_json::json!([]));
    assert_eq!(body["directories"], serde_json::json!(["docs/"]));

    let req = test::TestRequest::get().uri("/api/tree?prefix=docs/").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        body["files"],
        serde_json::json!(["docs/_draft.txt", "docs/a.txt", "docs/sub/b.txt"])
    );
    assert_eq!(body["directories"], serde_json::json!(["docs/sub/"]));
}

#[actix_web::test]
async fn test_upload_then_serve() {
    let (state, blobs, _) = test_state(true);
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/upload?directory=2024&name=report.pdf")
        .insert_header(("content-type", "application/pdf"))
        .set_payload(b"%PDF-1.7 body".to_vec())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["key"], "2024/report.pdf");
    assert_eq!(body["size"], 13);
    assert_eq!(blobs.read("2024/report.pdf").unwrap(), b"%PDF-1.7 body".to_vec());

    let req = test::TestRequest::get().uri("/2024/report.pdf").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "application/pdf");
    assert_eq!(
        resp.headers().get("cache-control").unwrap(),
        "public, max-age=31536000, immutable"
    );
    assert!(resp.headers().get("etag").is_some());
    let bytes = test::read_body(resp).await;
    assert_eq!(bytes.as_ref(), b"%PDF-1.7 body");
}

#[actix_web::test]
async fn test_upload_without_name_is_rejected() {
    let (state, blobs, _) = test_state(true);
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/upload?directory=2024")
        .set_payload(b"data".to_vec())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "No file");
    assert_eq!(blobs.object_count(), 0);
}

#[actix_web::test]
async fn test_oversize_upload_is_rejected_and_not_stored() {
    let mut config = AppConfig::for_testing();
    config.server.max_payload_size = 8;
    let blobs = Arc::new(MockBlobStore::new());
    let (state, _worker) =
        AppState::with_stores(config, blobs.clone(), Arc::new(MockUsageStore::new()));
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/upload?name=big.bin")
        .set_payload(vec![1u8; 20])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Upload exceeds 8 bytes");
    assert!(!blobs.contains("big.bin"));
}

#[actix_web::test]
async fn test_mkdir_creates_visible_directory() {
    let (state, blobs, _) = test_state(true);
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/mkdir")
        .set_json(serde_json::json!({"directory": "photos"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["directory"], "photos/");
    assert!(blobs.contains("photos/.placeholder"));

    let req = test::TestRequest::get().uri("/api/list").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["directories"], serde_json::json!(["photos/"]));

    let req = test::TestRequest::post()
        .uri("/api/mkdir")
        .set_json(serde_json::json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_delete_file_and_directory() {
    let (state, blobs, _) = test_state(true);
    blobs.insert("docs/a.txt", b"a");
    blobs.insert("docs/sub/b.txt", b"b");
    blobs.insert("notes.txt", b"n");
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/delete")
        .set_json(serde_json::json!({"key": "notes.txt", "isDir": false}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["deleted"], "file");
    assert_eq!(body["key"], "notes.txt");
    assert!(!blobs.contains("notes.txt"));

    let req = test::TestRequest::post()
        .uri("/api/delete")
        .set_json(serde_json::json!({"key": "docs", "isDir": true}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["deleted"], "directory");
    assert_eq!(body["prefix"], "docs/");
    assert_eq!(body["count"], 2);
    assert!(blobs.keys().iter().all(|k| !k.starts_with("docs/")));

    let req = test::TestRequest::post()
        .uri("/api/delete")
        .set_json(serde_json::json!({"isDir": true}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "No key");
}

#[actix_web::test]
async fn test_move_guards() {
    let (state, blobs, _) = test_state(true);
    blobs.insert("docs/a.txt", b"a");
    blobs.insert("docs/sub/b.txt", b"b");
    let app = init_app!(state);

    let cases = [
        (serde_json::json!({"from": "docs", "to": "docs/", "isDir": true}), StatusCode::BAD_REQUEST, "Cannot move folder into itself"),
        (serde_json::json!({"from": "docs", "to": "docs/sub/deeper", "isDir": true}), StatusCode::BAD_REQUEST, "Cannot move a folder into itself or its subdirectory"),
        (serde_json::json!({"from": "docs"}), StatusCode::BAD_REQUEST, "Missing from/to"),
        (serde_json::json!({"from": "ghost.txt", "to": "b.txt"}), StatusCode::NOT_FOUND, "File not found"),
    ];

    for (payload, status, message) in cases {
        let req = test::TestRequest::post()
            .uri("/api/move")
            .set_json(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), status);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], message);
    }

    assert_eq!(
        blobs.keys(),
        vec!["docs/a.txt".to_string(), "docs/sub/b.txt".to_string()]
    );
}

#[actix_web::test]
async fn test_move_and_rename() {
    let (state, blobs, _) = test_state(true);
    blobs.insert("docs/a.txt", b"alpha");
    blobs.insert("docs/sub/b.txt", b"beta");
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/move")
        .set_json(serde_json::json!({"from": "docs/a.txt", "to": "archive/a.txt", "isDir": false}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["moved"], "file");
    assert_eq!(blobs.read("archive/a.txt").unwrap(), b"alpha".to_vec());
    assert!(!blobs.contains("docs/a.txt"));

    let req = test::TestRequest::post()
        .uri("/api/rename")
        .set_json(serde_json::json!({"from": "docs/", "to": "papers", "isDir": true}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["renamed"], "directory");
    assert_eq!(body["from"], "docs");
    assert_eq!(body["to"], "papers");
    assert_eq!(blobs.read("papers/sub/b.txt").unwrap(), b"beta".to_vec());
    assert!(!blobs.contains("docs/sub/b.txt"));
}

#[actix_web::test]
async fn test_partial_move_failure_reports_detail() {
    let (state, blobs, _) = test_state(true);
    blobs.insert("docs/a.txt", b"a");
    blobs.insert("docs/b.txt", b"b");
    blobs.fail_puts_to("moved/b.txt");
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/move")
        .set_json(serde_json::json!({"from": "docs", "to": "moved", "isDir": true}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "1 of 2 entries failed");
    assert_eq!(body["report"]["applied"], serde_json::json!(["docs/a.txt"]));
    assert_eq!(body["report"]["failed"][0]["key"], "docs/b.txt");
    assert_eq!(body["report"]["failed"][0]["stage"], "write");

    assert!(blobs.contains("docs/b.txt"));
    assert!(blobs.contains("moved/a.txt"));
}

#[actix_web::test]
async fn test_malformed_json_uses_error_envelope() {
    let (state, _, _) = test_state(true);
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/move")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_web::test]
async fn test_serve_policy_and_missing() {
    let (state, blobs, usage) = test_state(true);
    blobs.insert("index.html", b"<html></html>");
    blobs.insert("private/keys.txt", b"k");
    let app = init_app!(state);

    for uri in ["/index.html", "/private/keys.txt", "/.env"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{}", uri);
        assert_eq!(test::read_body(resp).await.as_ref(), b"Forbidden");
    }

    let req = test::TestRequest::get().uri("/nope.png").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(test::read_body(resp).await.as_ref(), b"Not Found");

    assert_eq!(usage.total_hits().unwrap(), 0);
}

#[actix_web::test]
async fn test_serve_infers_content_type_and_honours_etag() {
    let (state, blobs, _) = test_state(true);
    blobs.insert("css/site.css", b"body{}");
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/css/site.css").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.headers().get("content-type").unwrap(), "text/css; charset=utf-8");
    let etag = resp.headers().get("etag").unwrap().to_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/css/site.css")
        .insert_header(("If-None-Match", etag))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
}

#[actix_web::test]
async fn test_serve_records_usage() {
    let (state, blobs, usage) = test_state(true);
    blobs.insert("a.png", b"png");
    let app = init_app!(state);

    for _ in 0..2 {
        let req = test::TestRequest::get()
            .uri("/a.png")
            .insert_header(("Referer", "https://example.com/home"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let req = test::TestRequest::get().uri("/a.png").to_request();
    test::call_service(&app, req).await;

    wait_for_hits(&usage, 3).await;

    let records = usage.file_usage("a.png").unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].site, "example.com");
    assert_eq!(records[0].page, "/home");
    assert_eq!(records[0].count, 2);
    assert_eq!(records[1].site, "direct");
    assert_eq!(records[1].page, "");

    let req = test::TestRequest::get().uri("/api/usage?limit=5").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["top_files"][0]["file"], "a.png");
    assert_eq!(body["top_files"][0]["total"], 3);

    let req = test::TestRequest::get().uri("/api/usage/file?key=a.png").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["file"], "a.png");
    assert_eq!(body["records"][0]["count"], 2);
}

#[actix_web::test]
async fn test_root_document_and_config() {
    let (state, blobs, _) = test_state(true);
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(test::read_body(resp).await.as_ref(), b"index.html missing");

    blobs.insert("index.html", b"<html><head><title>Drive</title></head><body></body></html>");
    let req = test::TestRequest::get().uri("/").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(page.contains("<script>window.CONFIG = "));
    assert!(page.contains("\"ENV\":\"dev\""));
    assert!(page.find("window.CONFIG").unwrap() < page.find("</head>").unwrap());

    let req = test::TestRequest::get().uri("/config").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["ENV"], "dev");
    assert_eq!(body["API_BASE"], "/api");
}

#[actix_web::test]
async fn test_unknown_api_route_is_json_404() {
    let (state, _, _) = test_state(true);
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/api/nothing").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("/api/nothing"));
}

#[actix_web::test]
async fn test_move_directory_into_parent_loses_nothing() {
    let (state, blobs, _) = test_state(true);
    blobs.insert("a/b/b/c/y", b"DEEP");
    blobs.insert("a/b/c/y", b"SHALLOW");
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/move")
        .set_json(serde_json::json!({"from": "a/b", "to": "a", "isDir": true}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["count"], 2);

    assert_eq!(blobs.read("a/c/y").unwrap(), b"SHALLOW".to_vec());
    assert_eq!(blobs.read("a/b/c/y").unwrap(), b"DEEP".to_vec());
    assert_eq!(blobs.object_count(), 2);
}
