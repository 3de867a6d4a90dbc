//! 工作区扫描
//!
//! 按扩展名把文件归到 Terraform / Bicep。隐藏目录和依赖缓存目录整棵剪掉，
//! 大仓库上不会被 `node_modules` 拖慢。

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::dialect::Dialect;
use crate::error::{ErrorPolicy, ScanError};

/// 固定剪枝的目录名（依赖缓存、工具本地状态）
pub const EXCLUDED_DIRS: &[&str] = &["node_modules", ".terraform", ".terragrunt-cache"];

/// 扫描结果：方言 → 相对路径（`/` 分隔，已排序）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub root: PathBuf,
    pub files: BTreeMap<Dialect, Vec<String>>,
}

impl ScanResult {
    pub fn files_of(&self, dialect: Dialect) -> &[String] {
        self.files.get(&dialect).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

/// 遍历错误的处理策略：根目录本身出错即中止，其余条目跳过
pub fn walk_error_policy(err: &walkdir::Error) -> ErrorPolicy {
    if err.depth() == 0 {
        ErrorPolicy::Abort
    } else {
        ErrorPolicy::Continue
    }
}

fn is_pruned_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || EXCLUDED_DIRS.contains(&name.as_ref())
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        // 根本身就是文件
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    } else {
        parts.join("/")
    }
}

/// 扫描目录下的 IaC 文件
pub fn scan(root: &Path, recursive: bool) -> Result<ScanResult, ScanError> {
    let mut walker = WalkDir::new(root);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut result = ScanResult {
        root: root.to_path_buf(),
        files: BTreeMap::new(),
    };

    for entry in walker.into_iter().filter_entry(|e| !is_pruned_dir(e)) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => match walk_error_policy(&err) {
                ErrorPolicy::Abort => {
                    return Err(ScanError::Root {
                        root: root.to_path_buf(),
                        reason: err.to_string(),
                    })
                }
                ErrorPolicy::Continue => {
                    debug!(error = %err, "skipping unreadable entry");
                    continue;
                }
            },
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let dialect = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Dialect::from_extension);
        if let Some(dialect) = dialect {
            result
                .files
                .entry(dialect)
                .or_default()
                .push(relative_path(root, entry.path()));
        }
    }

    for files in result.files.values_mut() {
        files.sort();
    }
    Ok(result)
}
