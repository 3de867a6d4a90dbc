//! HTTP Skill 路由（进程内 oneshot）

mod common;

use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use iac_validator::config::Settings;
use iac_validator::http::{router, sign, SkillState, SIGNATURE_HEADER};
use iac_validator::tools::build_registry;

fn app(settings: Settings) -> Router {
    let registry = build_registry(common::toolchain(settings.clone())).unwrap();
    router(Arc::new(SkillState::new(Arc::new(registry), &settings)))
}

fn offline(root: &Path) -> Router {
    app(common::offline_settings(root))
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, req).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn empty_code_is_rejected_before_any_adapter() {
    let root = tempfile::tempdir().unwrap();
    let (status, body) = send(offline(root.path()), post("/validate", r#"{"code":"","type":"terraform"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(String::from_utf8(body).unwrap(), "Code is required");
    assert_eq!(common::entries(root.path()), 0);
}

#[tokio::test]
async fn unsupported_type_and_bad_json_are_400() {
    let root = tempfile::tempdir().unwrap();

    let (status, body) = send(offline(root.path()), post("/validate", r#"{"code":"x: 1","type":"yaml"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("'yaml' is not one of: terraform, bicep"));

    let (status, _) = send(offline(root.path()), post("/validate", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(offline(root.path()), post("/generate", r#"{"description":"","type":"bicep"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(offline(root.path()), post("/explain", r#"{"resource":"  "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(String::from_utf8(body).unwrap(), "Resource is required");
}

#[tokio::test]
async fn bodies_are_checked_against_the_capability_schema() {
    let root = tempfile::tempdir().unwrap();

    let (status, body) = send(offline(root.path()), post("/generate", r#"{"type":"bicep"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(String::from_utf8(body).unwrap(), "Description is required");

    let (status, body) = send(offline(root.path()), post("/explain", r#"{"resource":"x","property":5}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("'property'"));

    let (status, _) = send(offline(root.path()), post("/validate", "[1,2]")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::entries(root.path()), 0);
}

#[tokio::test]
async fn wrong_method_is_405() {
    let root = tempfile::tempdir().unwrap();
    let (status, _) = send(offline(root.path()), get("/validate")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = send(offline(root.path()), post("/health", "{}")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn health_reports_service_name() {
    let root = tempfile::tempdir().unwrap();
    let (status, body) = send_json(offline(root.path()), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy", "service": "iac-helper-skillset"}));
}

#[tokio::test]
async fn manifest_is_served_or_500() {
    let root = tempfile::tempdir().unwrap();

    let (status, body) = send(offline(root.path()), get("/manifest.json")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(String::from_utf8(body).unwrap(), "Manifest not found");

    let manifest = root.path().join("manifest.json");
    std::fs::write(&manifest, r#"{"name":"iac-helper"}"#).unwrap();
    let settings = Settings {
        manifest_path: manifest,
        ..common::offline_settings(root.path())
    };
    let resp = app(settings).oneshot(get("/manifest.json")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/json");
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], br#"{"name":"iac-helper"}"#);
}

#[tokio::test]
async fn missing_tool_is_200_with_invalid_result() {
    let root = tempfile::tempdir().unwrap();
    let (status, body) = send_json(
        offline(root.path()),
        post("/validate", r#"{"code":"param x string","type":"bicep"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert!(body["errors"][0]["message"].as_str().unwrap().contains("Azure CLI not found"));
    assert_eq!(common::entries(root.path()), 0);
}

#[tokio::test]
async fn signature_is_checked_when_secret_configured() {
    let root = tempfile::tempdir().unwrap();
    let settings = || Settings {
        webhook_secret: Some("s3cret".to_string()),
        ..common::offline_settings(root.path())
    };
    let body = r#"{"resource":"azurerm_storage_account"}"#;

    let mut req = post("/explain", body);
    req.headers_mut()
        .insert(SIGNATURE_HEADER, "sha256=deadbeef".parse().unwrap());
    let (status, _) = send(app(settings()), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut req = post("/explain", body);
    req.headers_mut()
        .insert(SIGNATURE_HEADER, sign("s3cret", body.as_bytes()).unwrap().parse().unwrap());
    let (status, json) = send_json(app(settings()), req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["explanation"].as_str().unwrap().contains("Storage Account"));

    // 缺少签名头时放行
    let (status, _) = send(app(settings()), post("/explain", body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn generate_and_explain_return_catalog_entries() {
    let root = tempfile::tempdir().unwrap();

    let (status, body) = send_json(
        offline(root.path()),
        post("/generate", r#"{"description":"AKS cluster for prod","type":"terraform"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["language"], "terraform");
    assert!(body["code"].as_str().unwrap().contains("azurerm_kubernetes_cluster"));

    let (status, body) = send_json(
        offline(root.path()),
        post("/explain", r#"{"resource":"something_unknown"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["explanation"].as_str().unwrap().contains("not found"));
    assert!(body.get("examples").is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn validate_reports_bicep_errors() {
    let root = tempfile::tempdir().unwrap();
    let (status, body) = send_json(
        app(common::fake::settings(root.path())),
        post(
            "/validate",
            r#"{"code":"resource sa 'Microsoft.Storage/storageAccounts@2023-01-01'\n","type":"bicep"}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "valid": false,
            "errors": [{
                "line": 2,
                "column": 7,
                "message": "Expected the \"=\" character at this location.",
                "code": "BCP018"
            }]
        })
    );
    assert_eq!(common::entries(root.path()), 0);

    let (status, body) = send_json(
        app(common::fake::settings(root.path())),
        post("/validate", r#"{"code":"param location string = 'eastus'","type":"Bicep"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"valid": true}));
}
