//! 运行配置
//!
//! 启动时从环境变量 + 命令行构造一次，之后只读共享。

use std::path::PathBuf;
use std::time::Duration;

use crate::diagnostics::Severity;
use crate::dialect::Dialect;

/// 外部工具默认超时
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_PORT: u16 = 8080;

/// 非结构化输出的行分类规则
///
/// 同一行出现多个标记时，位置最靠前的标记决定级别；同位置时 error 优先。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPolicy {
    pub error_markers: Vec<String>,
    pub warning_markers: Vec<String>,
}

impl MarkerPolicy {
    pub fn new<E, W>(errors: E, warnings: W) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        W: IntoIterator,
        W::Item: Into<String>,
    {
        Self {
            error_markers: errors.into_iter().map(Into::into).collect(),
            warning_markers: warnings.into_iter().map(Into::into).collect(),
        }
    }

    pub fn terraform_default() -> Self {
        Self::new(["Error"], ["Warning"])
    }

    pub fn bicep_default() -> Self {
        Self::new(["Error", "error", "BCP"], ["Warning", "warning"])
    }

    /// None 表示该行只是普通信息
    pub fn classify(&self, line: &str) -> Option<Severity> {
        let first = |markers: &[String]| {
            markers
                .iter()
                .filter(|m| !m.is_empty())
                .filter_map(|m| line.find(m.as_str()))
                .min()
        };

        match (first(&self.error_markers), first(&self.warning_markers)) {
            (Some(e), Some(w)) if w < e => Some(Severity::Warning),
            (Some(_), _) => Some(Severity::Error),
            (None, Some(_)) => Some(Severity::Warning),
            (None, None) => None,
        }
    }
}

/// 全局设置
#[derive(Debug, Clone)]
pub struct Settings {
    pub terraform_bin: String,
    pub az_bin: String,
    pub tool_timeout: Duration,
    /// 代码片段临时工作区的父目录
    pub temp_root: PathBuf,
    pub terraform_markers: MarkerPolicy,
    pub bicep_markers: MarkerPolicy,
    pub port: u16,
    pub manifest_path: PathBuf,
    pub webhook_secret: Option<String>,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            terraform_bin: "terraform".to_string(),
            az_bin: "az".to_string(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            temp_root: std::env::temp_dir(),
            terraform_markers: MarkerPolicy::terraform_default(),
            bicep_markers: MarkerPolicy::bicep_default(),
            port: DEFAULT_PORT,
            manifest_path: PathBuf::from("manifest.json"),
            webhook_secret: None,
            debug: false,
        }
    }
}

impl Settings {
    /// 从进程环境读取
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意 key 查找函数读取（测试时注入）
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Settings::default();

        if let Some(bin) = get("IAC_TERRAFORM_BIN") {
            settings.terraform_bin = bin;
        }
        if let Some(bin) = get("IAC_AZ_BIN") {
            settings.az_bin = bin;
        }
        if let Some(secs) = get("IAC_TOOL_TIMEOUT_SECS").and_then(|v| v.trim().parse::<u64>().ok()) {
            if secs > 0 {
                settings.tool_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(port) = get("PORT").and_then(|v| v.trim().parse::<u16>().ok()) {
            settings.port = port;
        }
        settings.webhook_secret = get("GITHUB_WEBHOOK_SECRET");
        settings.debug = get("DEBUG").is_some();

        if let Some(markers) = get("IAC_TERRAFORM_ERROR_MARKERS") {
            settings.terraform_markers.error_markers = split_markers(&markers);
        }
        if let Some(markers) = get("IAC_TERRAFORM_WARNING_MARKERS") {
            settings.terraform_markers.warning_markers = split_markers(&markers);
        }
        if let Some(markers) = get("IAC_BICEP_ERROR_MARKERS") {
            settings.bicep_markers.error_markers = split_markers(&markers);
        }
        if let Some(markers) = get("IAC_BICEP_WARNING_MARKERS") {
            settings.bicep_markers.warning_markers = split_markers(&markers);
        }

        settings
    }

    /// 日志级别：显式给出的优先；否则 DEBUG 把默认值提到 debug
    pub fn log_level<'a>(&self, explicit: Option<&'a str>) -> &'a str {
        match explicit {
            Some(level) => level,
            None if self.debug => "debug",
            None => "info",
        }
    }

    pub fn markers(&self, dialect: Dialect) -> &MarkerPolicy {
        match dialect {
            Dialect::Terraform => &self.terraform_markers,
            Dialect::Bicep => &self.bicep_markers,
        }
    }
}

fn split_markers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}
