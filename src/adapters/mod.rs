//! 校验适配器
//!
//! 每个外部工具家族一个适配器：构造调用、喂入目录或临时文件、
//! 捕获输出并归一化为 `Diagnostic`。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::diagnostics::ValidationReport;
use crate::dialect::Dialect;
use crate::error::ToolError;

pub mod bicep;
pub mod process;
pub mod terraform;

pub use bicep::BicepAdapter;
pub use terraform::TerraformAdapter;

/// 校验目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationTarget {
    /// 已存在的目录或文件
    Path(PathBuf),
    /// 内联代码片段，仅在一次调用内存在
    Snippet { code: String, dialect: Dialect },
}

/// 已落盘、可直接交给工具的目标
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// 工具的工作目录
    pub dir: PathBuf,
    /// 单文件目标（Bicep 文件、片段文件）
    pub file: Option<PathBuf>,
    /// 展示用名称
    pub label: String,
    /// 是否来自临时工作区
    pub ephemeral: bool,
}

#[async_trait]
pub trait ValidatorAdapter: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// 临时工作区的父目录
    fn temp_root(&self) -> &Path;

    /// 把磁盘路径解析成目标（校验路径存在、扩展名等）
    fn resolve(&self, path: &Path) -> Result<ResolvedTarget, ToolError>;

    /// 对已落盘的目标运行工具并解析输出
    async fn check(&self, target: &ResolvedTarget) -> Result<ValidationReport, ToolError>;

    async fn validate(&self, target: &ValidationTarget) -> Result<ValidationReport, ToolError> {
        match target {
            ValidationTarget::Path(path) => {
                let resolved = self.resolve(path)?;
                self.check(&resolved).await
            }
            ValidationTarget::Snippet { code, dialect } => {
                if *dialect != self.dialect() {
                    return Err(ToolError::invalid(
                        "type",
                        format!("{} adapter cannot validate {} code", self.dialect(), dialect),
                    ));
                }
                let workspace = SnippetWorkspace::create(self.temp_root(), *dialect, code)?;
                let result = self.check(&workspace.target()).await;
                // 无论校验结果如何都删除工作区；删除失败单独上报
                workspace.close()?;
                result
            }
        }
    }
}

/// 代码片段的临时工作区
///
/// 目录名唯一，内含且仅含一个按方言命名的文件。`close` 或 Drop
/// （包括 panic 展开）时整个目录被删除。
#[derive(Debug)]
pub struct SnippetWorkspace {
    dir: tempfile::TempDir,
    file: PathBuf,
}

impl SnippetWorkspace {
    pub fn create(root: &Path, dialect: Dialect, code: &str) -> Result<Self, ToolError> {
        let dir = tempfile::Builder::new()
            .prefix("iac-syntax-check-")
            .tempdir_in(root)
            .map_err(|e| {
                ToolError::Resource(format!("failed to create temp directory: {e}"))
            })?;
        let file = dir.path().join(dialect.snippet_file_name());
        std::fs::write(&file, code)
            .map_err(|e| ToolError::Resource(format!("failed to write temp file: {e}")))?;
        debug!(workspace = %dir.path().display(), "materialized snippet");
        Ok(Self { dir, file })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn target(&self) -> ResolvedTarget {
        ResolvedTarget {
            dir: self.dir.path().to_path_buf(),
            file: Some(self.file.clone()),
            label: "snippet".to_string(),
            ephemeral: true,
        }
    }

    pub fn close(self) -> Result<(), ToolError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            ToolError::Resource(format!(
                "failed to remove temp directory {}: {e}",
                path.display()
            ))
        })
    }
}

/// 相对路径转绝对路径（基于当前目录）
pub(crate) fn absolutize(path: &Path) -> Result<PathBuf, ToolError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| ToolError::Execution(format!("invalid path: {e}")))?;
    Ok(cwd.join(path))
}

/// 截断过长的工具输出，保留前几行
pub(crate) fn excerpt(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect();
    let mut out = lines.iter().take(max_lines).copied().collect::<Vec<_>>().join("\n");
    if lines.len() > max_lines {
        out.push_str(&format!("\n... ({} more lines)", lines.len() - max_lines));
    }
    out
}
