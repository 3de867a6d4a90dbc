//! IaC 方言

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 支持的 IaC 方言
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Terraform,
    Bicep,
}

impl Dialect {
    pub const ALL: [Dialect; 2] = [Dialect::Terraform, Dialect::Bicep];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Terraform => "terraform",
            Dialect::Bicep => "bicep",
        }
    }

    /// 文件扩展名（不含点）
    pub fn extension(&self) -> &'static str {
        match self {
            Dialect::Terraform => "tf",
            Dialect::Bicep => "bicep",
        }
    }

    /// 代码片段落盘时使用的文件名
    pub fn snippet_file_name(&self) -> &'static str {
        match self {
            Dialect::Terraform => "main.tf",
            Dialect::Bicep => "main.bicep",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Dialect::Terraform => "Terraform",
            Dialect::Bicep => "Bicep",
        }
    }

    /// 按扩展名识别（大小写不敏感）
    pub fn from_extension(ext: &str) -> Option<Self> {
        Dialect::ALL
            .into_iter()
            .find(|d| d.extension().eq_ignore_ascii_case(ext))
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported type: {0} (use 'terraform' or 'bicep')")]
pub struct UnknownDialect(pub String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terraform" => Ok(Dialect::Terraform),
            "bicep" => Ok(Dialect::Bicep),
            _ => Err(UnknownDialect(s.to_string())),
        }
    }
}
