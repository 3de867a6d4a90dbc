//! Bicep 适配器
//!
//! 调用 `az bicep build --file <path> --stdout`。编译器没有 JSON 诊断输出，
//! 结构化路径是它固定的诊断行格式：
//!
//! ```text
//! /path/main.bicep(2,7) : Error BCP018: Expected the "=" character at this location. [https://aka.ms/...]
//! ```

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use super::process::{self, Captured};
use super::{absolutize, excerpt, ResolvedTarget, ValidatorAdapter};
use crate::config::{MarkerPolicy, Settings};
use crate::diagnostics::{Diagnostic, Location, Severity, ValidationReport};
use crate::dialect::Dialect;
use crate::error::{AdapterCondition, ToolError};

const TOOL: &str = "az";
const INSTALL_HINT: &str =
    "Please install Azure CLI: https://docs.microsoft.com/cli/azure/install-azure-cli";

/// 编译器诊断行（az 可能加 `ERROR:` / `WARNING:` 前缀）
static DIAGNOSTIC_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:ERROR|WARNING):\s*)?(?P<file>.+?)\((?P<line>\d+),(?P<col>\d+)\)\s*:\s*(?P<level>[A-Za-z]+)\s+(?P<code>[A-Za-z][\w-]*)\s*:\s*(?P<msg>.+)$",
    )
    .unwrap()
});

/// 行尾的文档链接
static DOC_LINK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*\[https?://[^\]]+\]\s*$").unwrap()
});

/// 解析单行诊断
pub fn parse_diagnostic_line(line: &str) -> Option<Diagnostic> {
    let caps = DIAGNOSTIC_REGEX.captures(line.trim())?;
    let message = DOC_LINK_REGEX.replace(&caps["msg"], "").trim().to_string();
    let file = Path::new(&caps["file"])
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| caps["file"].to_string());
    let location = Location::new(
        file,
        caps["line"].parse().unwrap_or(0),
        caps["col"].parse().ok(),
    );
    Some(
        Diagnostic::new(Severity::from_tool(&caps["level"]), message)
            .with_code(&caps["code"])
            .with_location(location),
    )
}

pub struct BicepAdapter {
    settings: Arc<Settings>,
}

impl BicepAdapter {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ValidatorAdapter for BicepAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Bicep
    }

    fn temp_root(&self) -> &Path {
        &self.settings.temp_root
    }

    fn resolve(&self, path: &Path) -> Result<ResolvedTarget, ToolError> {
        let abs = absolutize(path)?;
        if !abs.to_string_lossy().to_lowercase().ends_with(".bicep") {
            return Err(ToolError::Execution(format!(
                "file must have .bicep extension: {}",
                abs.display()
            )));
        }
        if !abs.is_file() {
            return Err(ToolError::Execution(format!("file not found: {}", abs.display())));
        }
        let dir = abs
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| abs.clone());
        let label = abs
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| abs.display().to_string());
        Ok(ResolvedTarget {
            dir,
            file: Some(abs),
            label,
            ephemeral: false,
        })
    }

    async fn check(&self, target: &ResolvedTarget) -> Result<ValidationReport, ToolError> {
        let mut report = ValidationReport::new(Dialect::Bicep, &target.label);

        let Some(file) = &target.file else {
            return Err(ToolError::Execution("bicep validation requires a file".to_string()));
        };

        let Some(bin) = process::locate(&self.settings.az_bin) else {
            return Ok(report.with_condition(AdapterCondition::ToolUnavailable {
                tool: "Azure CLI".to_string(),
                install_hint: INSTALL_HINT,
            }));
        };

        let args = [
            std::ffi::OsString::from("bicep"),
            "build".into(),
            "--file".into(),
            file.as_os_str().to_os_string(),
            "--stdout".into(),
        ];
        let captured =
            match process::run(TOOL, &bin, args, Some(&target.dir), self.settings.tool_timeout).await {
                Ok(captured) => captured,
                Err(condition) => return Ok(report.with_condition(condition)),
            };

        normalize(&captured, &self.settings.bicep_markers, &mut report);
        info!(
            label = %report.target,
            errors = report.error_count(),
            warnings = report.warning_count(),
            "bicep build finished"
        );
        Ok(report)
    }
}

/// 把 `az bicep build` 的输出写入报告
///
/// 编译成功时 stdout 是 ARM 模板，只从 stderr 收集诊断；
/// 失败时对全部输出逐行解析，解析不了的行按标记分类。
pub fn normalize(captured: &Captured, markers: &MarkerPolicy, report: &mut ValidationReport) {
    if captured.success {
        report.artifact_bytes = Some(captured.stdout.len());
        for line in String::from_utf8_lossy(&captured.stderr).lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_diagnostic_line(line) {
                Some(diag) => report.push(diag),
                None => report.notes.push(line.to_string()),
            }
        }
        return;
    }

    let text = captured.text();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(diag) = parse_diagnostic_line(line) {
            report.push(diag);
        } else if let Some(severity) = markers.classify(line) {
            report.push(Diagnostic::new(severity, line));
        } else {
            report.notes.push(line.to_string());
        }
    }

    if report.error_count() == 0 {
        report.push(Diagnostic::error(format!("bicep build failed: {}", excerpt(&text, 20))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> ValidationReport {
        ValidationReport::new(Dialect::Bicep, "main.bicep")
    }

    #[test]
    fn parses_compiler_line() {
        let diag = parse_diagnostic_line(
            "/tmp/iac-syntax-check-x/main.bicep(2,7) : Error BCP018: Expected the \"=\" character at this location. [https://aka.ms/bicep/core-diagnostics#BCP018]",
        )
        .unwrap();
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.code.as_deref(), Some("BCP018"));
        assert_eq!(diag.message, "Expected the \"=\" character at this location.");
        assert_eq!(diag.location, Location::new("main.bicep", 2, Some(7)));
    }

    #[test]
    fn parses_prefixed_warning_and_linter_lines() {
        let diag = parse_diagnostic_line(
            "WARNING: /work/main.bicep(3,1) : Warning BCP081: Resource type \"Foo@2020\" does not have types available.",
        )
        .unwrap();
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.location.as_ref().map(|l| l.line), Some(3));

        let diag = parse_diagnostic_line(
            "/work/main.bicep(10,1) : Warning no-unused-params: Parameter \"env\" is declared but never used. [https://aka.ms/bicep/linter/no-unused-params]",
        )
        .unwrap();
        assert_eq!(diag.code.as_deref(), Some("no-unused-params"));
        assert_eq!(diag.message, "Parameter \"env\" is declared but never used.");
    }

    #[test]
    fn ordinary_lines_are_not_structured() {
        assert!(parse_diagnostic_line("Build succeeded.").is_none());
        assert!(parse_diagnostic_line("Unhandled error BCP000 in pipeline").is_none());
    }

    #[test]
    fn info_level_becomes_warning() {
        let diag = parse_diagnostic_line("main.bicep(1,1) : Info BCP999: Something informative").unwrap();
        assert_eq!(diag.severity, Severity::Warning);
    }

    #[test]
    fn success_records_artifact_size_and_warnings() {
        let captured = Captured {
            success: true,
            exit_code: Some(0),
            stdout: br#"{"$schema": "https://schema.management.azure.com/"}"#.to_vec(),
            stderr: b"/w/main.bicep(3,7) : Warning BCP081: Resource type has no types.\nA new Bicep release is available\n"
                .to_vec(),
        };
        let mut r = report();
        normalize(&captured, &MarkerPolicy::bicep_default(), &mut r);
        assert_eq!(r.artifact_bytes, Some(captured.stdout.len()));
        assert_eq!(r.warning_count(), 1);
        assert_eq!(r.notes, vec!["A new Bicep release is available"]);
        assert!(r.is_valid());
    }

    #[test]
    fn failure_uses_structured_then_markers() {
        let captured = Captured {
            success: false,
            exit_code: Some(1),
            stdout: Vec::new(),
            stderr: b"ERROR: /w/main.bicep(2,7) : Error BCP018: Expected the \"=\" character at this location.\nUnhandled error BCP000 in pipeline\nsee logs\n"
                .to_vec(),
        };
        let mut r = report();
        normalize(&captured, &MarkerPolicy::bicep_default(), &mut r);
        assert_eq!(r.error_count(), 2);
        assert_eq!(r.diagnostics[0].code.as_deref(), Some("BCP018"));
        assert_eq!(r.diagnostics[1].message, "Unhandled error BCP000 in pipeline");
        assert_eq!(r.notes, vec!["see logs"]);
        assert!(!r.is_valid());
    }

    #[test]
    fn unexplained_failure_keeps_raw_text() {
        let captured = Captured {
            success: false,
            exit_code: Some(2),
            stdout: Vec::new(),
            stderr: b"az: 'bicep' is misspelled or not recognized by the system.\n".to_vec(),
        };
        let mut r = report();
        normalize(&captured, &MarkerPolicy::bicep_default(), &mut r);
        assert_eq!(r.error_count(), 1);
        assert!(r.diagnostics[0].message.contains("not recognized"));
    }

    #[test]
    fn resolve_checks_extension_and_existence() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = BicepAdapter::new(Arc::new(Settings::default()));

        let err = adapter.resolve(&dir.path().join("main.tf")).unwrap_err();
        assert!(err.to_string().contains(".bicep extension"));

        let err = adapter.resolve(&dir.path().join("missing.bicep")).unwrap_err();
        assert!(err.to_string().starts_with("file not found"));

        let file = dir.path().join("Main.BICEP");
        std::fs::write(&file, "").unwrap();
        let resolved = adapter.resolve(&file).unwrap();
        assert_eq!(resolved.file.as_deref(), Some(file.as_path()));
        assert_eq!(resolved.label, "Main.BICEP");
    }
}
