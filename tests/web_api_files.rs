//! Web API File Tests
//!
//! Integration tests for the /api/files endpoints.

use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE, ETAG};
use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use filestore::web::handlers::AppState;
use filestore::web::middleware::{JwtClaims, JwtState};
use filestore::web::router::create_router;
use filestore::{BlobStore, Checksum, Database, FileService, StoragePath};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

const SECRET: &str = "test-secret-key-for-testing-only";
const MAX_UPLOAD_BYTES: u64 = 64 * 1024;

/// Create a test server with an in-memory database and a temporary storage root.
async fn create_test_server() -> (TestServer, FileService, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let db = Database::open_in_memory()
        .await
        .expect("Failed to create test database");
    let storage = BlobStore::new(dir.path()).expect("Failed to create blob store");
    let files = FileService::new(db, storage, MAX_UPLOAD_BYTES);

    let app_state = Arc::new(AppState::new(files.clone()));
    let jwt_state = Arc::new(JwtState::new(SECRET));
    let router = create_router(app_state, jwt_state, &[]);

    let server = TestServer::new(router).expect("Failed to create test server");
    (server, files, dir)
}

/// Mint a token the way the identity provider would.
fn token(sub: &str, role: Option<&str>) -> String {
    let now = chrono::Utc::now().timestamp() as u64;
    let claims = JwtClaims {
        sub: sub.to_string(),
        role: role.map(str::to_string),
        iat: now,
        exp: now + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("Failed to encode token")
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

fn file_form(name: &str, mime: &str, content: &[u8]) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(content.to_vec()).file_name(name).mime_type(mime),
    )
}

/// Upload a file and return the response data.
async fn upload(server: &TestServer, token: &str, name: &str, mime: &str, content: &[u8]) -> Value {
    let response = server
        .post("/api/files")
        .add_header(AUTHORIZATION, bearer(token))
        .multipart(file_form(name, mime, content))
        .await;

    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["data"].clone()
}

#[tokio::test]
async fn test_upload_file() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", Some("user"));

    let data = upload(&server, &user, "notes.txt", "text/plain", b"hello world").await;

    assert_eq!(data["original_file_name"], "notes.txt");
    assert_eq!(data["content_type"], "text/plain");
    assert_eq!(data["size_in_bytes"], 11);
    assert_eq!(data["created_by"], "alice");
    assert_eq!(
        data["checksum"],
        Checksum::of_bytes(b"hello world").as_str()
    );
    assert!(data.get("storage_path").is_none());
    let created_at = data["created_at"].as_str().unwrap();
    assert!(created_at.ends_with('Z'));
    assert!(chrono::DateTime::parse_from_rfc3339(created_at).is_ok());
}

#[tokio::test]
async fn test_upload_writes_date_sharded_blob() {
    let (server, files, _dir) = create_test_server().await;
    let user = token("alice", None);

    let data = upload(&server, &user, "a.txt", "text/plain", b"sharded").await;
    let id = data["id"].as_str().unwrap();

    let metadata = files.get(id).await.unwrap();
    let path = StoragePath::parse(&metadata.storage_path).unwrap();
    let segments: Vec<&str> = path.segments().collect();
    assert_eq!(segments.len(), 4);
    assert_eq!(segments[3], id);
    assert!(files.storage().file_exists(path.as_str()).unwrap());
}

#[tokio::test]
async fn test_upload_with_tags() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", None);

    let form = file_form("report.pdf", "application/pdf", b"%PDF-1.4")
        .add_text("tags", "finance,2024");
    let response = server
        .post("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .multipart(form)
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["data"]["tags"], "finance,2024");
}

#[tokio::test]
async fn test_upload_rejections() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", None);

    // Disallowed content type
    server
        .post("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .multipart(file_form("run.sh", "application/x-sh", b"#!/bin/sh"))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    // Empty content
    server
        .post("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .multipart(file_form("empty.txt", "text/plain", b""))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    // Over the configured limit but under the body limit
    let big = vec![b'x'; MAX_UPLOAD_BYTES as usize + 1];
    server
        .post("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .multipart(file_form("big.txt", "text/plain", &big))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    // No file part at all
    server
        .post("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .multipart(MultipartForm::new().add_text("tags", "orphan"))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    // Two file parts
    let form = file_form("a.txt", "text/plain", b"a").add_part(
        "file",
        Part::bytes(b"b".to_vec()).file_name("b.txt").mime_type("text/plain"),
    );
    server
        .post("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .multipart(form)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_rejected_uploads_leave_no_blobs() {
    let (server, files, dir) = create_test_server().await;
    let user = token("alice", None);

    let big = vec![b'x'; MAX_UPLOAD_BYTES as usize * 3];
    server
        .post("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .multipart(file_form("big.txt", "text/plain", &big))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    server
        .post("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .multipart(file_form("a.txt", "text/plain", b"abc").add_text("tags", "t".repeat(2001)))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    files.storage().cleanup_empty_dirs().unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(files.list(1, 20, None).await.unwrap().total_count, 0);
}

#[tokio::test]
async fn test_body_over_request_limit_is_payload_too_large() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", None);

    // Larger than the upload limit plus multipart allowance
    let oversized_tags = "t".repeat(MAX_UPLOAD_BYTES as usize + 2 * 1024 * 1024);
    let form = MultipartForm::new()
        .add_text("tags", oversized_tags)
        .add_part(
            "file",
            Part::bytes(b"abc".to_vec()).file_name("a.txt").mime_type("text/plain"),
        );

    server
        .post("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .multipart(form)
        .await
        .assert_status(StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_upload_at_limit_is_streamed_intact() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", None);
    let content: Vec<u8> = (0..MAX_UPLOAD_BYTES).map(|i| (i % 251) as u8).collect();

    let data = upload(&server, &user, "exact.csv", "text/csv", &content).await;
    assert_eq!(data["size_in_bytes"], MAX_UPLOAD_BYTES);
    assert_eq!(data["checksum"], Checksum::of_bytes(&content).as_str());

    let response = server
        .get(&format!("/api/files/{}/download", data["id"].as_str().unwrap()))
        .add_header(AUTHORIZATION, bearer(&user))
        .await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), content.as_slice());
}

#[tokio::test]
async fn test_tags_before_file_part() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", None);

    let form = MultipartForm::new().add_text("tags", "early").add_part(
        "file",
        Part::bytes(b"abc".to_vec()).file_name("a.txt").mime_type("text/plain"),
    );
    let response = server
        .post("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .multipart(form)
        .await;

    response.assert_status(StatusCode::CREATED);
    assert_eq!(response.json::<Value>()["data"]["tags"], "early");
}

#[tokio::test]
async fn test_upload_path_components_stripped_from_name() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", None);

    let data = upload(&server, &user, "../../etc/passwd.txt", "text/plain", b"root").await;
    assert_eq!(data["original_file_name"], "passwd.txt");
}

#[tokio::test]
async fn test_requires_authentication() {
    let (server, _files, _dir) = create_test_server().await;

    server
        .get("/api/files")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .get("/api/files")
        .add_header(AUTHORIZATION, "Bearer not-a-jwt")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .post("/api/files")
        .multipart(file_form("a.txt", "text/plain", b"a"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_files_paginated_and_searchable() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", None);

    upload(&server, &user, "alpha.txt", "text/plain", b"1").await;
    upload(&server, &user, "beta.txt", "text/plain", b"2").await;
    upload(&server, &user, "100%_done.txt", "text/plain", b"3").await;

    let response = server
        .get("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .add_query_param("page_number", 1)
        .add_query_param("page_size", 2)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["meta"]["total"], 3);
    assert_eq!(body["meta"]["total_pages"], 2);
    assert_eq!(body["meta"]["per_page"], 2);

    let response = server
        .get("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .add_query_param("search_term", "ALPHA")
        .await;
    let body: Value = response.json();
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"][0]["original_file_name"], "alpha.txt");

    // Wildcards are matched literally
    let response = server
        .get("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .add_query_param("search_term", "%_")
        .await;
    let body: Value = response.json();
    assert_eq!(body["meta"]["total"], 1);
}

#[tokio::test]
async fn test_get_file() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", None);
    let data = upload(&server, &user, "a.txt", "text/plain", b"abc").await;
    let id = data["id"].as_str().unwrap();

    let response = server
        .get(&format!("/api/files/{id}"))
        .add_header(AUTHORIZATION, bearer(&user))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["id"], id);

    server
        .get("/api/files/00000000-0000-0000-0000-000000000000")
        .add_header(AUTHORIZATION, bearer(&user))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_tags() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", None);
    let data = upload(&server, &user, "a.txt", "text/plain", b"abc").await;
    let id = data["id"].as_str().unwrap();

    let response = server
        .put(&format!("/api/files/{id}/tags"))
        .add_header(AUTHORIZATION, bearer(&user))
        .json(&json!({ "tags": "archived" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["tags"], "archived");
    assert!(body["data"]["updated_at"].is_string());

    server
        .put(&format!("/api/files/{id}/tags"))
        .add_header(AUTHORIZATION, bearer(&user))
        .json(&json!({ "tags": "x".repeat(2001) }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_download_file() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", None);
    let data = upload(&server, &user, "hello.txt", "text/plain", b"hello download").await;
    let id = data["id"].as_str().unwrap();

    let response = server
        .get(&format!("/api/files/{id}/download"))
        .add_header(AUTHORIZATION, bearer(&user))
        .await;

    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"hello download");
    assert_eq!(response.header(CONTENT_TYPE), "text/plain");
    assert_eq!(
        response.header(CONTENT_DISPOSITION),
        "attachment; filename=\"hello.txt\""
    );
    assert_eq!(
        response.header(ETAG).to_str().unwrap(),
        format!("\"{}\"", Checksum::of_bytes(b"hello download"))
    );
}

#[tokio::test]
async fn test_download_with_query_token() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", None);
    let data = upload(&server, &user, "link.txt", "text/plain", b"via link").await;
    let id = data["id"].as_str().unwrap();

    let response = server
        .get(&format!("/api/files/{id}/download"))
        .add_query_param("token", &user)
        .await;

    response.assert_status_ok();
    assert_eq!(response.as_bytes().as_ref(), b"via link");
}

#[tokio::test]
async fn test_preview_file() {
    let (server, _files, _dir) = create_test_server().await;
    let user = token("alice", None);

    let image = upload(&server, &user, "pic.png", "image/png", b"\x89PNG\r\n").await;
    let response = server
        .get(&format!("/api/files/{}/preview", image["id"].as_str().unwrap()))
        .add_header(AUTHORIZATION, bearer(&user))
        .await;
    response.assert_status_ok();
    assert_eq!(response.header(CONTENT_TYPE), "image/png");
    assert_eq!(
        response.header(CONTENT_DISPOSITION),
        "inline; filename=\"pic.png\""
    );

    let text = upload(&server, &user, "a.txt", "text/plain", b"abc").await;
    server
        .get(&format!("/api/files/{}/preview", text["id"].as_str().unwrap()))
        .add_header(AUTHORIZATION, bearer(&user))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_soft_delete_hides_file() {
    let (server, files, _dir) = create_test_server().await;
    let user = token("alice", None);
    let data = upload(&server, &user, "a.txt", "text/plain", b"abc").await;
    let id = data["id"].as_str().unwrap();
    let path = files.get(id).await.unwrap().storage_path;

    server
        .delete(&format!("/api/files/{id}"))
        .add_header(AUTHORIZATION, bearer(&user))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    server
        .get(&format!("/api/files/{id}"))
        .add_header(AUTHORIZATION, bearer(&user))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    server
        .get(&format!("/api/files/{id}/download"))
        .add_header(AUTHORIZATION, bearer(&user))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    // Deleting twice reports the file as missing
    server
        .delete(&format!("/api/files/{id}"))
        .add_header(AUTHORIZATION, bearer(&user))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let response = server
        .get("/api/files")
        .add_header(AUTHORIZATION, bearer(&user))
        .await;
    assert_eq!(response.json::<Value>()["meta"]["total"], 0);

    // The blob itself stays until a hard delete
    assert!(files.storage().file_exists(&path).unwrap());
}

#[tokio::test]
async fn test_hard_delete_requires_admin() {
    let (server, files, _dir) = create_test_server().await;
    let user = token("alice", Some("user"));
    let admin = token("root", Some("Admin"));
    let data = upload(&server, &user, "a.txt", "text/plain", b"abc").await;
    let id = data["id"].as_str().unwrap();
    let path = files.get(id).await.unwrap().storage_path;

    server
        .delete(&format!("/api/files/{id}/hard"))
        .add_header(AUTHORIZATION, bearer(&user))
        .await
        .assert_status(StatusCode::FORBIDDEN);
    assert!(files.storage().file_exists(&path).unwrap());

    server
        .delete(&format!("/api/files/{id}/hard"))
        .add_header(AUTHORIZATION, bearer(&admin))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert!(!files.storage().file_exists(&path).unwrap());

    server
        .delete(&format!("/api/files/{id}/hard"))
        .add_header(AUTHORIZATION, bearer(&admin))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hard_delete_after_soft_delete() {
    let (server, files, _dir) = create_test_server().await;
    let user = token("alice", None);
    let admin = token("root", Some("admin"));
    let data = upload(&server, &user, "a.txt", "text/plain", b"abc").await;
    let id = data["id"].as_str().unwrap();
    let path = files.get(id).await.unwrap().storage_path;

    server
        .delete(&format!("/api/files/{id}"))
        .add_header(AUTHORIZATION, bearer(&user))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert!(files.storage().file_exists(&path).unwrap());

    server
        .delete(&format!("/api/files/{id}/hard"))
        .add_header(AUTHORIZATION, bearer(&admin))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert!(!files.storage().file_exists(&path).unwrap());
}
