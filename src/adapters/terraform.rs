//! Terraform 适配器
//!
//! 流程：按需 `terraform init` → （片段）`terraform fmt -check` → `terraform validate -json`。
//! 三步顺序执行，后一步依赖前一步写到磁盘上的 `.terraform`。

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use super::process::{self, Captured};
use super::{absolutize, excerpt, ResolvedTarget, ValidatorAdapter};
use crate::config::{MarkerPolicy, Settings};
use crate::diagnostics::{Diagnostic, Location, Severity, ValidationReport};
use crate::dialect::Dialect;
use crate::error::{AdapterCondition, ErrorPolicy, ToolError};

const TOOL: &str = "terraform";
const INSTALL_HINT: &str = "Please install Terraform: https://www.terraform.io/downloads";

/// 人类可读输出中的位置行：`on main.tf line 3, in resource ...`
static LOCATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bon (\S+) line (\d+)").unwrap()
});

// ============================================================================
// `terraform validate -json` 输出结构
// ============================================================================

#[derive(Debug, Deserialize)]
struct ValidateOutput {
    valid: bool,
    #[serde(default)]
    diagnostics: Vec<RawDiagnostic>,
}

#[derive(Debug, Deserialize)]
struct RawDiagnostic {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    range: Option<RawRange>,
}

#[derive(Debug, Deserialize)]
struct RawRange {
    filename: String,
    start: RawPos,
}

#[derive(Debug, Deserialize)]
struct RawPos {
    line: u32,
    #[serde(default)]
    column: u32,
}

impl From<RawDiagnostic> for Diagnostic {
    fn from(raw: RawDiagnostic) -> Self {
        let message = if raw.detail.trim().is_empty() {
            raw.summary
        } else {
            format!("{}: {}", raw.summary, raw.detail)
        };
        let location = raw
            .range
            .and_then(|r| Location::new(r.filename, r.start.line, Some(r.start.column)));
        Diagnostic::new(Severity::from_tool(&raw.severity), message).with_location(location)
    }
}

// ============================================================================
// init 失败策略
// ============================================================================

/// `terraform init` 的失败形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitFailure {
    /// 进程正常结束但退出码非 0
    Exited(String),
    /// 超时或无法启动
    Condition(AdapterCondition),
}

/// init 失败后是否继续 validate
///
/// 只有进程根本无法启动时才中止：此时 validate 也不可能运行。
pub fn init_failure_policy(failure: &InitFailure) -> ErrorPolicy {
    match failure {
        InitFailure::Exited(_) => ErrorPolicy::Continue,
        InitFailure::Condition(AdapterCondition::TimedOut { .. }) => ErrorPolicy::Continue,
        InitFailure::Condition(AdapterCondition::ToolUnavailable { .. }) => ErrorPolicy::Abort,
        InitFailure::Condition(AdapterCondition::SpawnFailed { .. }) => ErrorPolicy::Abort,
    }
}

/// 目录下还没有 `.terraform` 时需要 init
pub fn needs_init(dir: &Path) -> bool {
    !dir.join(".terraform").exists()
}

// ============================================================================
// 适配器
// ============================================================================

pub struct TerraformAdapter {
    settings: Arc<Settings>,
}

impl TerraformAdapter {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    async fn init(&self, bin: &Path, dir: &Path) -> Option<InitFailure> {
        info!(dir = %dir.display(), "running terraform init");
        let outcome = process::run(
            TOOL,
            bin,
            ["init", "-backend=false", "-no-color"],
            Some(dir),
            self.settings.tool_timeout,
        )
        .await;

        match outcome {
            Ok(captured) if captured.success => None,
            Ok(captured) => Some(InitFailure::Exited(captured.text())),
            Err(condition) => Some(InitFailure::Condition(condition)),
        }
    }

    async fn check_format(&self, bin: &Path, dir: &Path, file: &Path, report: &mut ValidationReport) {
        let file_name = file.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        let args = [
            std::ffi::OsString::from("fmt"),
            "-check".into(),
            "-no-color".into(),
            file_name,
        ];
        match process::run(TOOL, bin, args, Some(dir), self.settings.tool_timeout).await {
            Ok(captured) if captured.success => {}
            Ok(captured) => {
                let detail = excerpt(&captured.text(), 3);
                let message = if detail.is_empty() {
                    "Formatting issues detected (run `terraform fmt`)".to_string()
                } else {
                    format!("Formatting issues detected (run `terraform fmt`): {detail}")
                };
                report.push(Diagnostic::warning(message));
            }
            Err(condition) => warn!(error = %condition, "terraform fmt skipped"),
        }
    }
}

#[async_trait]
impl ValidatorAdapter for TerraformAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Terraform
    }

    fn temp_root(&self) -> &Path {
        &self.settings.temp_root
    }

    /// 目录直接使用；文件则取其所在目录
    fn resolve(&self, path: &Path) -> Result<ResolvedTarget, ToolError> {
        let abs = absolutize(path)?;
        let meta = std::fs::metadata(&abs)
            .map_err(|_| ToolError::Execution(format!("path not found: {}", abs.display())))?;
        let dir = if meta.is_dir() {
            abs
        } else {
            abs.parent().map(Path::to_path_buf).unwrap_or(abs)
        };
        Ok(ResolvedTarget {
            label: dir.display().to_string(),
            dir,
            file: None,
            ephemeral: false,
        })
    }

    async fn check(&self, target: &ResolvedTarget) -> Result<ValidationReport, ToolError> {
        let mut report = ValidationReport::new(Dialect::Terraform, &target.label);

        let Some(bin) = process::locate(&self.settings.terraform_bin) else {
            return Ok(report.with_condition(AdapterCondition::ToolUnavailable {
                tool: TOOL.to_string(),
                install_hint: INSTALL_HINT,
            }));
        };

        if needs_init(&target.dir) {
            if let Some(failure) = self.init(&bin, &target.dir).await {
                match (init_failure_policy(&failure), failure) {
                    (ErrorPolicy::Abort, InitFailure::Condition(condition)) => {
                        return Ok(report.with_condition(condition));
                    }
                    (_, InitFailure::Exited(output)) => {
                        warn!(dir = %target.dir.display(), "terraform init failed, validating anyway");
                        report.push(Diagnostic::warning(format!(
                            "Init warning: {}",
                            excerpt(&output, 5)
                        )));
                    }
                    (_, InitFailure::Condition(condition)) => {
                        warn!(error = %condition, "terraform init did not complete, validating anyway");
                        report.push(Diagnostic::warning(format!("Init warning: {condition}")));
                    }
                }
            }
        }

        if target.ephemeral {
            if let Some(file) = &target.file {
                self.check_format(&bin, &target.dir, file, &mut report).await;
            }
        }

        let captured = match process::run(
            TOOL,
            &bin,
            ["validate", "-json", "-no-color"],
            Some(&target.dir),
            self.settings.tool_timeout,
        )
        .await
        {
            Ok(captured) => captured,
            Err(condition) => return Ok(report.with_condition(condition)),
        };

        normalize(&captured, &self.settings.terraform_markers, &mut report);
        info!(
            label = %report.target,
            errors = report.error_count(),
            warnings = report.warning_count(),
            "terraform validate finished"
        );
        Ok(report)
    }
}

// ============================================================================
// 输出归一化
// ============================================================================

/// 把 `terraform validate` 的输出写入报告
///
/// 优先解析 JSON；失败则退回按行分类。
pub fn normalize(captured: &Captured, markers: &MarkerPolicy, report: &mut ValidationReport) {
    match decode_structured(captured) {
        Some(output) => {
            let valid = output.valid;
            report
                .diagnostics
                .extend(output.diagnostics.into_iter().map(Diagnostic::from));
            if !valid && report.error_count() == 0 {
                report.push(Diagnostic::error("terraform reported the configuration as invalid"));
            }
        }
        None => classify_lines(&captured.text(), captured.success, markers, report),
    }
}

fn decode_structured(captured: &Captured) -> Option<ValidateOutput> {
    serde_json::from_slice::<ValidateOutput>(&captured.combined())
        .or_else(|_| serde_json::from_slice::<ValidateOutput>(&captured.stdout))
        .ok()
}

fn classify_lines(text: &str, success: bool, markers: &MarkerPolicy, report: &mut ValidationReport) {
    let first_new = report.diagnostics.len();

    for raw in text.lines() {
        let line = raw.trim_matches(|c: char| c.is_whitespace() || matches!(c, '│' | '╷' | '╵'));
        if line.is_empty() {
            continue;
        }

        if let Some(severity) = markers.classify(line) {
            report.push(Diagnostic::new(severity, line));
            continue;
        }

        // 位置行挂到最近一条本轮产生的诊断上
        if let Some(caps) = LOCATION_REGEX.captures(line) {
            let line_no = caps[2].parse::<u32>().unwrap_or(0);
            if report.diagnostics.len() > first_new {
                if let Some(last) = report.diagnostics.last_mut() {
                    if last.location.is_none() {
                        last.location = Location::new(&caps[1], line_no, None);
                    }
                }
            }
        }
        report.notes.push(line.to_string());
    }

    let produced_error = report.diagnostics[first_new..].iter().any(Diagnostic::is_error);
    if !success && !produced_error {
        report.push(Diagnostic::error(format!(
            "terraform validate failed: {}",
            excerpt(text, 20)
        )));
    }
}
