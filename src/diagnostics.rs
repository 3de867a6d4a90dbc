//! 统一诊断模型
//!
//! 所有校验适配器（Terraform / Bicep）都把工具输出归一化成 `Diagnostic`。

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::AdapterCondition;

/// 严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    /// 工具上报的级别字符串；`error` 以外的一律视为 warning
    pub fn from_tool(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("error") {
            Severity::Error
        } else {
            Severity::Warning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// 源码位置，行列均从 1 开始
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl Location {
    /// 行号为 0 时返回 None
    pub fn new(file: impl Into<String>, line: u32, column: Option<u32>) -> Option<Self> {
        if line == 0 {
            return None;
        }
        Some(Self {
            file: file.into(),
            line,
            column: column.filter(|c| *c > 0),
        })
    }
}

/// 单条诊断
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// 工具自带的诊断码（如 BCP018）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            code: None,
            location: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// 至少一条 error 级诊断即为失败
pub fn is_failing(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// 一次校验调用的完整结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub dialect: Dialect,
    /// 展示用的目标描述（目录、文件名或 "snippet"）
    pub target: String,
    pub diagnostics: Vec<Diagnostic>,
    /// 未归类的原始输出行，只用于展示，不影响有效性
    pub notes: Vec<String>,
    /// 工具缺失、超时等环境状况
    pub condition: Option<AdapterCondition>,
    /// 编译产物大小（Bicep 生成的 ARM 模板）
    pub artifact_bytes: Option<usize>,
}

impl ValidationReport {
    pub fn new(dialect: Dialect, target: impl Into<String>) -> Self {
        Self {
            dialect,
            target: target.into(),
            diagnostics: Vec::new(),
            notes: Vec::new(),
            condition: None,
            artifact_bytes: None,
        }
    }

    pub fn with_condition(mut self, condition: AdapterCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn is_valid(&self) -> bool {
        self.condition.is_none() && !is_failing(&self.diagnostics)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics.len() - self.error_count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

// ============================================================================
// 对外摘要
// ============================================================================

/// 摘要中的一条错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// `{valid, errors}` 形式的校验摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SummaryError>,
}

impl From<&ValidationReport> for ValidationSummary {
    /// 只保留 error 级别；环境状况也作为一条错误返回
    fn from(report: &ValidationReport) -> Self {
        let mut errors: Vec<SummaryError> = report
            .errors()
            .map(|d| SummaryError {
                line: d.location.as_ref().map(|l| l.line),
                column: d.location.as_ref().and_then(|l| l.column),
                message: d.message.clone(),
                code: d.code.clone(),
            })
            .collect();
        if let Some(condition) = &report.condition {
            errors.push(SummaryError {
                line: None,
                column: None,
                message: condition.to_string(),
                code: None,
            });
        }
        Self {
            valid: report.is_valid(),
            errors,
        }
    }
}
