//! Markdown 报告渲染
//!
//! 工具调用结果统一渲染成一段 Markdown 文本。

use crate::catalog::{ExplainResponse, GenerateResponse};
use crate::diagnostics::{Diagnostic, Severity, ValidationReport};
use crate::dialect::Dialect;
use crate::error::AdapterCondition;
use crate::scanner::ScanResult;

/// 校验报告
pub fn validation_report(report: &ValidationReport) -> String {
    let mut out = format!(
        "### {} validation: {}\n\n",
        report.dialect.display_name(),
        report.target
    );

    if let Some(condition) = &report.condition {
        out.push_str(&format!("❌ {}\n", condition_headline(condition)));
        out.push_str(&format!("\n> [!CAUTION]\n> {}\n", condition));
    } else if report.is_valid() {
        out.push_str(&format!("✅ {} validation passed\n", report.dialect.display_name()));
    } else {
        out.push_str(&format!("❌ {} validation failed\n", report.dialect.display_name()));
    }

    out.push_str(&format!(
        "\n**Summary**: {} error(s), {} warning(s)\n",
        report.error_count(),
        report.warning_count()
    ));
    if let Some(bytes) = report.artifact_bytes {
        out.push_str(&format!("**ARM template**: {} bytes\n", bytes));
    }

    if !report.diagnostics.is_empty() {
        out.push_str("\n## Diagnostics\n\n");
        for (i, diag) in report.diagnostics.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, diagnostic_line(diag)));
        }
    }

    if !report.notes.is_empty() {
        out.push_str("\n## Tool output\n\n```text\n");
        for note in &report.notes {
            out.push_str(note);
            out.push('\n');
        }
        out.push_str("```\n");
    }

    out
}

fn condition_headline(condition: &AdapterCondition) -> String {
    match condition {
        AdapterCondition::ToolUnavailable { tool, .. } => format!("{} is not installed", tool),
        AdapterCondition::TimedOut { tool, .. } => format!("{} timed out", tool),
        AdapterCondition::SpawnFailed { tool, .. } => format!("{} could not be started", tool),
    }
}

fn diagnostic_line(diag: &Diagnostic) -> String {
    let icon = match diag.severity {
        Severity::Error => "🔴",
        Severity::Warning => "⚠️",
    };
    let mut line = format!("{} **{}**", icon, diag.severity.as_str());
    if let Some(loc) = &diag.location {
        match loc.column {
            Some(col) => line.push_str(&format!(" `{}:{}:{}`", loc.file, loc.line, col)),
            None => line.push_str(&format!(" `{}:{}`", loc.file, loc.line)),
        }
    }
    if let Some(code) = &diag.code {
        line.push_str(&format!(" [{}]", code));
    }

    // 多行消息：首行跟在标题后，其余缩进成引用
    let mut parts = diag.message.lines();
    line.push_str(&format!(" {}", parts.next().unwrap_or_default()));
    for rest in parts.filter(|l| !l.trim().is_empty()) {
        line.push_str(&format!("\n   > {}", rest.trim()));
    }
    line
}

/// 工作区扫描结果
pub fn scan_result(result: &ScanResult) -> String {
    let mut out = format!("### IaC files in {}\n\n", result.root.display());

    if result.total() == 0 {
        out.push_str("No Terraform or Bicep files found.\n");
        return out;
    }

    for dialect in Dialect::ALL {
        let files = result.files_of(dialect);
        if files.is_empty() {
            continue;
        }
        out.push_str(&format!(
            "**{}** ({} file(s))\n",
            dialect.display_name(),
            files.len()
        ));
        for file in files {
            out.push_str(&format!("- {}\n", file));
        }
        out.push('\n');
    }

    out.push_str(&format!("**Total**: {} file(s)\n", result.total()));
    out
}

/// 生成的模板
pub fn generated(resp: &GenerateResponse) -> String {
    let mut out = format!("```{}\n{}", resp.language, resp.code);
    if !resp.code.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("```\n");
    if !resp.notes.is_empty() {
        out.push_str(&format!("\n> [!NOTE]\n> {}\n", resp.notes));
    }
    out
}

/// 资源说明
pub fn explanation(resp: &ExplainResponse) -> String {
    let mut out = format!("{}\n", resp.explanation);

    for example in &resp.examples {
        out.push_str(&format!("\n## Example\n\n```\n{}", example));
        if !example.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n");
    }
    if !resp.related_resources.is_empty() {
        out.push_str("\n## Related resources\n\n");
        for related in &resp.related_resources {
            out.push_str(&format!("- `{}`\n", related));
        }
    }
    if !resp.documentation_url.is_empty() {
        out.push_str(&format!("\n📖 {}\n", resp.documentation_url));
    }
    out
}
