//! MCP Protocol Handler
//!
//! 处理 JSON-RPC 2.0 请求/响应（按行分隔的 stdio 传输）

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::ToolError;
use crate::registry::{Registry, ToolOutput};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "iac-validator-mcp";

/// JSON-RPC 请求
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
    /// 缺省表示通知；显式 `null` 仍是请求
    #[serde(default, deserialize_with = "present")]
    id: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// JSON-RPC 响应：result 与 error 恰好一个
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Value,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: McpErrorCode, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data,
        }
    }
}

/// JSON-RPC 2.0 保留错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpErrorCode {
    /// 行不是合法 JSON
    ParseError = -32700,
    /// JSON 合法但不是请求信封
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    /// 参数错误 / 未知工具
    InvalidParams = -32602,
    InternalError = -32603,
}

impl McpErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

type MethodResult = Result<Value, JsonRpcError>;

// ============================================================================
// Server
// ============================================================================

/// MCP Server
pub struct McpServer {
    registry: Arc<Registry>,
}

impl McpServer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// 处理一行输入；返回需要写回的响应（通知与空行没有响应）
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let response = self.handle_message(trimmed).await?;
        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                // 结果无法序列化时仍然要回一个带同一 id 的错误
                let fallback = JsonRpcResponse::failure(
                    response.id,
                    JsonRpcError::new(McpErrorCode::InternalError, e.to_string(), None),
                );
                serde_json::to_string(&fallback).ok()
            }
        }
    }

    async fn handle_message(&self, text: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "parse error");
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::new(McpErrorCode::ParseError, "Parse error", Some(json!(e.to_string()))),
                ));
            }
        };

        let req: JsonRpcRequest = match JsonRpcRequest::deserialize(&value) {
            Ok(req) => req,
            // 不是请求信封（数组、标量、缺 method）：总要回复，取不到 id 就用 null
            Err(e) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                warn!(error = %e, "invalid request envelope");
                return Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(
                        McpErrorCode::InvalidRequest,
                        "Invalid Request",
                        Some(json!(e.to_string())),
                    ),
                ));
            }
        };

        debug!(method = %req.method, notification = req.id.is_none(), "request");
        let outcome = self.dispatch(&req.method, req.params).await;

        // 通知永远不回复，即使方法未知
        let id = req.id?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> MethodResult {
        match method {
            // MCP 协议方法
            "initialize" => Ok(handle_initialize()),
            "initialized" | "notifications/initialized" => Ok(json!({})),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(params).await,

            // 未知方法
            _ => Err(JsonRpcError::new(
                McpErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
                Some(json!({ "method": method })),
            )),
        }
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self
            .registry
            .descriptors()
            .filter_map(|d| serde_json::to_value(d).ok())
            .collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, params: Option<Value>) -> MethodResult {
        let params: ToolCallParams = params
            .ok_or_else(|| invalid_params("missing params", None))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| invalid_params("invalid params", Some(json!(e.to_string()))))
            })?;

        let arguments = match params.arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(invalid_params(
                    "invalid params",
                    Some(json!("arguments must be an object")),
                ))
            }
        };

        info!(tool = %params.name, "tools/call");
        let output = match self.registry.dispatch(&params.name, arguments).await {
            Ok(output) => output,
            Err(e) if e.is_request_error() => return Err(request_error(&e)),
            // 业务失败：正常 result + isError
            Err(e) => {
                warn!(tool = %params.name, error = %e, "tool failed");
                ToolOutput::error(format!("Error: {e}"))
            }
        };

        serde_json::to_value(output).map_err(|e| {
            JsonRpcError::new(McpErrorCode::InternalError, e.to_string(), None)
        })
    }

    /// 逐行处理直到 EOF。读错误和写错误向上传播。
    pub async fn run<R, W>(&self, mut input: R, mut output: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP server ready on stdio");
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf).await? == 0 {
                break; // EOF
            }

            let line = String::from_utf8_lossy(&buf);
            if let Some(response) = self.handle_line(&line).await {
                output.write_all(response.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
            }
        }
        info!("stdin closed, shutting down");
        Ok(())
    }
}

fn handle_initialize() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn invalid_params(message: &str, data: Option<Value>) -> JsonRpcError {
    JsonRpcError::new(McpErrorCode::InvalidParams, message, data)
}

fn request_error(err: &ToolError) -> JsonRpcError {
    let data = match err {
        ToolError::UnknownCapability(name) => json!({ "tool": name }),
        ToolError::InvalidArguments { param, reason } => json!({ "param": param, "reason": reason }),
        other => json!(other.to_string()),
    };
    invalid_params(&err.to_string(), Some(data))
}
