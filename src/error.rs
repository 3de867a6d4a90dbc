//! 错误类型定义
//!
//! 三层错误：
//! - `ToolError`: 请求/能力层（未知工具、参数错误、执行失败、临时工作区故障）
//! - `AdapterCondition`: 外部工具环境状况，作为报告的一部分返回而不是 `Err`
//! - `ScanError`: 目录扫描根路径不可遍历

use std::path::PathBuf;
use std::time::Duration;

const MISSING_REASON: &str = "parameter is required";
const EMPTY_REASON: &str = "must not be empty";

/// 能力调用错误
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// 注册表中没有该能力
    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    /// 参数缺失、类型不符或取值不在枚举中
    #[error("invalid argument '{param}': {reason}")]
    InvalidArguments { param: String, reason: String },

    /// 同名能力重复注册
    #[error("capability already registered: {0}")]
    DuplicateCapability(String),

    /// 业务层失败（路径不存在、扩展名不对等），以 isError 内容返回
    #[error("{0}")]
    Execution(String),

    /// 临时工作区创建/写入/删除失败
    #[error("workspace error: {0}")]
    Resource(String),
}

impl ToolError {
    pub fn invalid(param: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::InvalidArguments {
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// 必填参数缺失（或为 null）
    pub fn missing(param: impl Into<String>) -> Self {
        Self::invalid(param, MISSING_REASON)
    }

    /// 字符串参数为空或只有空白
    pub fn empty(param: impl Into<String>) -> Self {
        Self::invalid(param, EMPTY_REASON)
    }

    /// 缺失或为空时返回参数名
    pub fn absent_param(&self) -> Option<&str> {
        match self {
            ToolError::InvalidArguments { param, reason }
                if reason == MISSING_REASON || reason == EMPTY_REASON =>
            {
                Some(param)
            }
            _ => None,
        }
    }

    /// 是否属于请求形态错误（映射为 JSON-RPC -32602 / HTTP 400）
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            ToolError::UnknownCapability(_) | ToolError::InvalidArguments { .. }
        )
    }
}

impl From<ScanError> for ToolError {
    fn from(err: ScanError) -> Self {
        ToolError::Execution(err.to_string())
    }
}

/// 外部工具的环境状况
///
/// 这些状况让 `valid = false`，但不会变成协议错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterCondition {
    #[error("{tool} not found on PATH. {install_hint}")]
    ToolUnavailable {
        tool: String,
        install_hint: &'static str,
    },

    #[error("{tool} did not finish within {}s and was killed", after.as_secs_f64())]
    TimedOut { tool: String, after: Duration },

    #[error("failed to start {tool}: {reason}")]
    SpawnFailed { tool: String, reason: String },
}

/// 扫描错误
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to scan directory {}: {reason}", root.display())]
    Root { root: PathBuf, reason: String },
}

/// 尽力而为站点上的错误处理决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// 记录后继续
    Continue,
    /// 中止当前操作并上报
    Abort,
}
