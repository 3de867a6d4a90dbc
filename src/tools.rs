//! 能力实现
//!
//! 参数在进入 handler 时一次性解码成强类型结构，适配器拿到的都是已校验的值。

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::adapters::{BicepAdapter, TerraformAdapter, ValidationTarget, ValidatorAdapter};
use crate::catalog;
use crate::config::Settings;
use crate::diagnostics::{ValidationReport, ValidationSummary};
use crate::dialect::Dialect;
use crate::error::ToolError;
use crate::registry::{CapabilityDescriptor, CapabilityHandler, ParamType, Registry, ToolOutput};
use crate::render;
use crate::scanner;

// ============================================================================
// 适配器集合
// ============================================================================

/// 两个前端共享的只读适配器集合
pub struct Toolchain {
    pub settings: Arc<Settings>,
    terraform: TerraformAdapter,
    bicep: BicepAdapter,
}

impl Toolchain {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            terraform: TerraformAdapter::new(settings.clone()),
            bicep: BicepAdapter::new(settings.clone()),
            settings,
        }
    }

    pub fn adapter(&self, dialect: Dialect) -> &dyn ValidatorAdapter {
        match dialect {
            Dialect::Terraform => &self.terraform,
            Dialect::Bicep => &self.bicep,
        }
    }

    pub async fn validate_path(
        &self,
        dialect: Dialect,
        path: PathBuf,
    ) -> Result<ValidationReport, ToolError> {
        self.adapter(dialect)
            .validate(&ValidationTarget::Path(path))
            .await
    }

    pub async fn validate_snippet(
        &self,
        dialect: Dialect,
        code: String,
    ) -> Result<ValidationReport, ToolError> {
        if code.trim().is_empty() {
            return Err(ToolError::empty("code"));
        }
        self.adapter(dialect)
            .validate(&ValidationTarget::Snippet { code, dialect })
            .await
    }
}

// ============================================================================
// 参数结构
// ============================================================================

fn decode<T: DeserializeOwned>(args: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| ToolError::invalid("arguments", e.to_string()))
}

fn parse_dialect(raw: &str) -> Result<Dialect, ToolError> {
    raw.parse::<Dialect>()
        .map_err(|e| ToolError::invalid("type", e.to_string()))
}

fn non_empty(param: &str, value: String) -> Result<String, ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::empty(param));
    }
    Ok(value)
}

#[derive(Debug, Deserialize)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct SnippetArgs {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// `recursive` 既接受字符串也接受布尔值（描述符里用 `accepts` 放行布尔）
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    /// 只有（忽略大小写的）"false" 表示关闭
    pub fn enabled(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Text(s) => !s.trim().eq_ignore_ascii_case("false"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListArgs {
    pub path: String,
    #[serde(default)]
    pub recursive: Option<Flag>,
}

impl ListArgs {
    pub fn recursive(&self) -> bool {
        self.recursive.as_ref().map_or(true, Flag::enabled)
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateArgs {
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct ExplainArgs {
    pub resource: String,
    #[serde(default)]
    pub property: Option<String>,
}

fn report_output(report: &ValidationReport) -> ToolOutput {
    ToolOutput::text(render::validation_report(report))
        .flagged(!report.is_valid())
        .with_structured(&ValidationSummary::from(report))
}

// ============================================================================
// Handlers
// ============================================================================

struct ValidateTerraform(Arc<Toolchain>);

#[async_trait]
impl CapabilityHandler for ValidateTerraform {
    async fn call(&self, args: Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let args: PathArgs = decode(args)?;
        let report = self
            .0
            .validate_path(Dialect::Terraform, PathBuf::from(args.path))
            .await?;
        Ok(report_output(&report))
    }
}

struct ValidateBicep(Arc<Toolchain>);

#[async_trait]
impl CapabilityHandler for ValidateBicep {
    async fn call(&self, args: Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let args: PathArgs = decode(args)?;
        let report = self
            .0
            .validate_path(Dialect::Bicep, PathBuf::from(args.path))
            .await?;
        Ok(report_output(&report))
    }
}

struct CheckSyntax(Arc<Toolchain>);

#[async_trait]
impl CapabilityHandler for CheckSyntax {
    async fn call(&self, args: Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let args: SnippetArgs = decode(args)?;
        let dialect = parse_dialect(&args.kind)?;
        let report = self.0.validate_snippet(dialect, args.code).await?;
        Ok(report_output(&report))
    }
}

struct ListFiles;

#[async_trait]
impl CapabilityHandler for ListFiles {
    async fn call(&self, args: Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let args: ListArgs = decode(args)?;
        let recursive = args.recursive();
        let root = PathBuf::from(&args.path);

        // walkdir 是阻塞 IO
        let result = tokio::task::spawn_blocking(move || scanner::scan(&root, recursive))
            .await
            .map_err(|e| ToolError::Execution(format!("scan task failed: {e}")))??;

        info!(root = %result.root.display(), total = result.total(), "scanned workspace");
        Ok(ToolOutput::text(render::scan_result(&result)))
    }
}

struct GenerateIac;

#[async_trait]
impl CapabilityHandler for GenerateIac {
    async fn call(&self, args: Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let args: GenerateArgs = decode(args)?;
        let dialect = parse_dialect(&args.kind)?;
        let description = non_empty("description", args.description)?;
        let resp = catalog::generate(dialect, &description);
        Ok(ToolOutput::text(render::generated(&resp)).with_structured(&resp))
    }
}

struct ExplainResource;

#[async_trait]
impl CapabilityHandler for ExplainResource {
    async fn call(&self, args: Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let args: ExplainArgs = decode(args)?;
        let resource = non_empty("resource", args.resource)?;
        let resp = catalog::explain(&resource, args.property.as_deref());
        Ok(ToolOutput::text(render::explanation(&resp)).with_structured(&resp))
    }
}

// ============================================================================
// 注册
// ============================================================================

const DIALECTS: &[&str] = &["terraform", "bicep"];

/// 构建包含全部能力的注册表
pub fn build_registry(toolchain: Arc<Toolchain>) -> Result<Registry, ToolError> {
    let mut registry = Registry::new();

    registry.register(
        CapabilityDescriptor::new(
            "validate_terraform",
            "Validate Terraform configuration files in a directory. Runs 'terraform init' (if needed) and 'terraform validate' to check for syntax and configuration errors.",
        )
        .param(
            "path",
            ParamType::String,
            "Path to the Terraform directory or file to validate. Can be absolute or relative to the workspace.",
            true,
        ),
        Arc::new(ValidateTerraform(toolchain.clone())),
    )?;

    registry.register(
        CapabilityDescriptor::new(
            "validate_bicep",
            "Validate a Bicep file by running 'az bicep build'. Returns any syntax or semantic errors found in the Bicep code.",
        )
        .param(
            "path",
            ParamType::String,
            "Path to the Bicep file to validate. Must be a .bicep file.",
            true,
        ),
        Arc::new(ValidateBicep(toolchain.clone())),
    )?;

    registry.register(
        CapabilityDescriptor::new(
            "check_iac_syntax",
            "Quick syntax check for IaC code snippets. Validates Terraform HCL or Bicep code without requiring a full project structure.",
        )
        .param("code", ParamType::String, "The IaC code to validate.", true)
        .param("type", ParamType::String, "The type of IaC code.", true)
        .allowed("type", DIALECTS),
        Arc::new(CheckSyntax(toolchain)),
    )?;

    registry.register(
        CapabilityDescriptor::new(
            "list_iac_files",
            "List all Terraform (.tf) and Bicep (.bicep) files in a directory. Useful for understanding the structure of an IaC project.",
        )
        .param("path", ParamType::String, "Path to the directory to scan for IaC files.", true)
        .param(
            "recursive",
            ParamType::String,
            "Whether to scan subdirectories (true/false). Defaults to true.",
            false,
        )
        .accepts("recursive", ParamType::Boolean),
        Arc::new(ListFiles),
    )?;

    registry.register(
        CapabilityDescriptor::new(
            "generate_iac",
            "Generate a Terraform or Bicep template from a natural-language description of Azure infrastructure.",
        )
        .param(
            "description",
            ParamType::String,
            "What the infrastructure should contain, e.g. 'storage account with GRS'.",
            true,
        )
        .param("type", ParamType::String, "The IaC language to generate.", true)
        .allowed("type", DIALECTS),
        Arc::new(GenerateIac),
    )?;

    registry.register(
        CapabilityDescriptor::new(
            "explain_iac_resource",
            "Explain an Azure IaC resource type with examples, best practices and related resources.",
        )
        .param(
            "resource",
            ParamType::String,
            "Resource type, e.g. 'azurerm_storage_account' or 'Microsoft.Storage/storageAccounts'.",
            true,
        )
        .param("property", ParamType::String, "Optional property to focus on.", false),
        Arc::new(ExplainResource),
    )?;

    Ok(registry)
}
