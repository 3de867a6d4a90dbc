//! 代码片段校验：假工具脚本驱动完整流程，检查临时工作区被清理
#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use iac_validator::adapters::ValidationTarget;
use iac_validator::config::Settings;
use iac_validator::dialect::Dialect;
use iac_validator::error::AdapterCondition;
use iac_validator::tools::build_registry;

use common::fake;

const UNDECLARED: &str = r#"resource "azurerm_resource_group" "rg" {
  location = var.region
  name     = "rg-demo"
}
"#;

const DECLARED: &str = r#"variable "region" {
  type = string
}

resource "azurerm_resource_group" "rg" {
  location = var.region
  name     = "rg-demo"
}
"#;

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn undeclared_variable_is_reported_and_workspace_removed() {
    let root = tempfile::tempdir().unwrap();
    let toolchain = common::toolchain(fake::settings(root.path()));

    let report = toolchain
        .validate_snippet(Dialect::Terraform, UNDECLARED.to_string())
        .await
        .unwrap();

    assert!(!report.is_valid());
    let errors: Vec<_> = report.errors().collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("\"region\""), "{}", errors[0].message);
    assert_eq!(errors[0].location.as_ref().map(|l| l.line), Some(2));
    assert_eq!(common::entries(root.path()), 0);
}

#[tokio::test]
async fn declared_variable_passes() {
    let root = tempfile::tempdir().unwrap();
    let toolchain = common::toolchain(fake::settings(root.path()));

    let report = toolchain
        .adapter(Dialect::Terraform)
        .validate(&ValidationTarget::Snippet {
            code: DECLARED.to_string(),
            dialect: Dialect::Terraform,
        })
        .await
        .unwrap();

    assert!(report.is_valid(), "{report:?}");
    assert!(report.condition.is_none());
    assert_eq!(common::entries(root.path()), 0);
}

#[tokio::test]
async fn tool_call_renders_invalid_report_as_error_content() {
    let root = tempfile::tempdir().unwrap();
    let registry = build_registry(common::toolchain(fake::settings(root.path()))).unwrap();

    let out = registry
        .dispatch("check_iac_syntax", args(json!({"code": UNDECLARED, "type": "terraform"})))
        .await
        .unwrap();

    assert!(out.is_error);
    let text = out.joined_text();
    assert!(text.contains("❌ Terraform validation failed"), "{text}");
    assert!(text.contains("`main.tf:2:14`"), "{text}");
    assert_eq!(common::entries(root.path()), 0);
}

#[tokio::test]
async fn directory_target_is_initialized_once() {
    let root = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    std::fs::write(project.path().join("main.tf"), DECLARED).unwrap();
    let toolchain = common::toolchain(fake::settings(root.path()));

    let report = toolchain
        .validate_path(Dialect::Terraform, project.path().join("main.tf"))
        .await
        .unwrap();

    assert!(report.is_valid(), "{report:?}");
    assert!(project.path().join(".terraform").is_dir());
}

#[tokio::test]
async fn missing_tool_is_a_condition() {
    let root = tempfile::tempdir().unwrap();
    let toolchain = common::toolchain(common::offline_settings(root.path()));

    let report = toolchain
        .validate_snippet(Dialect::Terraform, DECLARED.to_string())
        .await
        .unwrap();

    assert!(!report.is_valid());
    assert!(report.diagnostics.is_empty());
    assert!(matches!(
        report.condition,
        Some(AdapterCondition::ToolUnavailable { ref tool, .. }) if tool == "terraform"
    ));
    assert_eq!(common::entries(root.path()), 0);
}

#[tokio::test]
async fn hanging_tool_times_out() {
    let root = tempfile::tempdir().unwrap();
    let settings = Settings {
        terraform_bin: fake::tools().hanging.to_string_lossy().into_owned(),
        tool_timeout: Duration::from_millis(300),
        ..common::offline_settings(root.path())
    };
    let toolchain = common::toolchain(settings);

    let report = toolchain
        .validate_snippet(Dialect::Terraform, DECLARED.to_string())
        .await
        .unwrap();

    assert!(!report.is_valid());
    assert!(matches!(report.condition, Some(AdapterCondition::TimedOut { .. })));
    // init 超时只降级为警告
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.message.starts_with("Init warning:")));
    assert_eq!(common::entries(root.path()), 0);
}

#[tokio::test]
async fn init_failure_and_format_drift_stay_warnings() {
    let root = tempfile::tempdir().unwrap();
    let settings = Settings {
        terraform_bin: fake::tools().drifting.to_string_lossy().into_owned(),
        ..common::offline_settings(root.path())
    };
    let toolchain = common::toolchain(settings);

    let report = toolchain
        .validate_snippet(Dialect::Terraform, DECLARED.to_string())
        .await
        .unwrap();

    assert!(report.is_valid(), "{report:?}");
    assert_eq!(report.error_count(), 0);
    assert_eq!(report.warning_count(), 2);
    let init = report
        .diagnostics
        .iter()
        .find(|d| d.message.starts_with("Init warning:"))
        .expect("init warning");
    assert!(init.message.contains("Failed to query available provider packages"), "{}", init.message);
    let fmt = report
        .diagnostics
        .iter()
        .find(|d| d.message.starts_with("Formatting issues detected"))
        .expect("format warning");
    assert!(fmt.message.contains("main.tf"), "{}", fmt.message);
    assert_eq!(common::entries(root.path()), 0);
}

#[tokio::test]
async fn bicep_snippet_diagnostics_are_structured() {
    let root = tempfile::tempdir().unwrap();
    let toolchain = common::toolchain(fake::settings(root.path()));

    let report = toolchain
        .validate_snippet(
            Dialect::Bicep,
            "resource sa 'Microsoft.Storage/storageAccounts@2023-01-01'\n".to_string(),
        )
        .await
        .unwrap();
    assert!(!report.is_valid());
    let err = report.errors().next().unwrap();
    assert_eq!(err.code.as_deref(), Some("BCP018"));
    assert_eq!(err.location.as_ref().map(|l| (l.line, l.column)), Some((2, Some(7))));

    let report = toolchain
        .validate_snippet(Dialect::Bicep, "param location string = 'eastus'\n".to_string())
        .await
        .unwrap();
    assert!(report.is_valid(), "{report:?}");
    assert!(report.artifact_bytes.unwrap_or(0) > 0);
    assert_eq!(common::entries(root.path()), 0);
}

#[tokio::test]
async fn concurrent_snippets_use_separate_workspaces() {
    let root = tempfile::tempdir().unwrap();
    let toolchain = common::toolchain(fake::settings(root.path()));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let toolchain = Arc::clone(&toolchain);
            let code = if i % 2 == 0 { UNDECLARED } else { DECLARED };
            tokio::spawn(async move {
                toolchain
                    .validate_snippet(Dialect::Terraform, code.to_string())
                    .await
                    .map(|r| r.is_valid())
            })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap().unwrap());
    }
    assert_eq!(results, vec![false, true, false, true]);
    assert_eq!(common::entries(root.path()), 0);
}
