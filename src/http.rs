//! HTTP Skill 服务
//!
//! 每个能力一个 POST 路由，请求体就是能力参数，经同一个注册表分发。
//! HTTP 状态码只表达传输层失败；校验不通过仍是 200 + `valid: false`。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::ToolError;
use crate::registry::{Registry, ToolOutput};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const SERVICE_NAME: &str = "iac-helper-skillset";

/// 路由共享的只读状态
pub struct SkillState {
    pub registry: Arc<Registry>,
    pub manifest_path: PathBuf,
    pub webhook_secret: Option<String>,
}

impl SkillState {
    pub fn new(registry: Arc<Registry>, settings: &Settings) -> Self {
        Self {
            registry,
            manifest_path: settings.manifest_path.clone(),
            webhook_secret: settings.webhook_secret.clone(),
        }
    }
}

// ============================================================================
// 签名校验
// ============================================================================

/// `sha256=<hex>` 形式的签名
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// 校验 `X-Hub-Signature-256`。缺少该头时放行。
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(header) = header else {
        return true;
    };
    let Some(expected) = header
        .trim()
        .strip_prefix("sha256=")
        .and_then(|h| hex::decode(h).ok())
    else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    // 常量时间比较
    mac.verify_slice(&expected).is_ok()
}

fn check_signature(state: &SkillState, headers: &HeaderMap, body: &[u8]) -> Result<(), Response> {
    let Some(secret) = state.webhook_secret.as_deref() else {
        return Ok(());
    };
    let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if verify_signature(secret, body, header) {
        Ok(())
    } else {
        warn!("rejected request with invalid signature");
        Err((StatusCode::UNAUTHORIZED, "Invalid signature").into_response())
    }
}

fn decode(body: &[u8]) -> Result<Map<String, Value>, Response> {
    serde_json::from_slice(body).map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Invalid JSON: {e}")).into_response()
    })
}

/// 参数缺失或为空时给出 `Code is required` 这样的短句
fn request_error_text(err: &ToolError) -> String {
    match err.absent_param() {
        Some(param) => {
            let mut chars = param.chars();
            let head: String = chars.next().map(|c| c.to_uppercase().collect()).unwrap_or_default();
            format!("{}{} is required", head, chars.as_str())
        }
        None => err.to_string(),
    }
}

fn tool_error_response(err: ToolError) -> Response {
    if err.is_request_error() {
        return (StatusCode::BAD_REQUEST, request_error_text(&err)).into_response();
    }
    warn!(error = %err, "capability failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

/// 校验签名、解码请求体，再经注册表调用能力；返回其结构化结果
async fn invoke(state: &SkillState, headers: &HeaderMap, body: &[u8], capability: &str) -> Response {
    if let Err(resp) = check_signature(state, headers, body) {
        return resp;
    }
    let args = match decode(body) {
        Ok(args) => args,
        Err(resp) => return resp,
    };

    match state.registry.dispatch(capability, args).await {
        Ok(ToolOutput { structured: Some(value), .. }) => Json(value).into_response(),
        Ok(output) => {
            warn!(capability, "capability returned no structured result");
            (StatusCode::INTERNAL_SERVER_ERROR, output.joined_text()).into_response()
        }
        Err(err) => tool_error_response(err),
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_validate(
    State(state): State<Arc<SkillState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&state, &headers, &body, "check_iac_syntax").await
}

async fn handle_generate(
    State(state): State<Arc<SkillState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&state, &headers, &body, "generate_iac").await
}

async fn handle_explain(
    State(state): State<Arc<SkillState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    invoke(&state, &headers, &body, "explain_iac_resource").await
}

async fn handle_health() -> Response {
    Json(json!({ "status": "healthy", "service": SERVICE_NAME })).into_response()
}

async fn handle_manifest(State(state): State<Arc<SkillState>>) -> Response {
    match tokio::fs::read(&state.manifest_path).await {
        Ok(bytes) => ([(CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => {
            warn!(path = %state.manifest_path.display(), error = %e, "manifest unreadable");
            (StatusCode::INTERNAL_SERVER_ERROR, "Manifest not found").into_response()
        }
    }
}

/// 每个请求记录进入和完成两行日志
async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    info!("→ {} {}", method, path);
    let resp = next.run(req).await;
    info!(
        status = resp.status().as_u16(),
        "← {} {} [{:?}]",
        method,
        path,
        started.elapsed()
    );
    resp
}

pub fn router(state: Arc<SkillState>) -> Router {
    Router::new()
        .route("/validate", post(handle_validate))
        .route("/generate", post(handle_generate))
        .route("/explain", post(handle_explain))
        .route("/health", get(handle_health))
        .route("/manifest.json", get(handle_manifest))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// 绑定端口并运行，直到进程退出
pub async fn serve(state: Arc<SkillState>, port: u16) -> anyhow::Result<()> {
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    let local_addr = listener.local_addr()?;

    info!("IaC skill service listening on http://{}", local_addr);
    if state.webhook_secret.is_some() {
        info!("signature verification enabled ({})", SIGNATURE_HEADER);
    }

    axum::serve(listener, app).await?;
    Ok(())
}
