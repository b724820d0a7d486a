use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::{DirEntry, Walk, WalkBuilder};
use thiserror::Error;

use crate::domain::cancel::CancelToken;
use crate::domain::outcome::ScanTarget;
use crate::error::ScanError;

/// 文件筛选条件
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub excluded_dirs: HashSet<String>,
    pub excluded_paths: HashSet<String>,
}

impl FileFilter {
    /// 创建新的文件过滤器
    pub fn new(
        min_size: Option<u64>,
        max_size: Option<u64>,
        excluded_dirs: Vec<String>,
        excluded_paths: Vec<String>,
    ) -> Self {
        Self {
            min_size,
            max_size,
            excluded_dirs: excluded_dirs.into_iter().collect(),
            excluded_paths: excluded_paths.into_iter().collect(),
        }
    }

    /// 检查文件是否符合大小要求
    pub fn matches_size(&self, size: u64) -> bool {
        let min_ok = self.min_size.map_or(true, |min| size >= min);
        let max_ok = self.max_size.map_or(true, |max| size <= max);
        min_ok && max_ok
    }

    /// 检查目录名是否被排除
    pub fn is_dir_excluded(&self, name: &str) -> bool {
        self.excluded_dirs.contains(name)
    }

    /// 检查路径是否被排除
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        let normalized_path = path.to_string_lossy().replace('\\', "/");

        for excluded_path in &self.excluded_paths {
            let normalized_excluded = excluded_path.replace('\\', "/");

            // 精确匹配
            if normalized_path == normalized_excluded {
                return true;
            }

            // 文件名匹配
            if let Some(file_name) = path.file_name() {
                if file_name.to_string_lossy() == *excluded_path {
                    return true;
                }
            }

            // 路径结尾匹配，只在路径分隔符处生效
            let suffix = format!("/{}", normalized_excluded.trim_start_matches('/'));
            if normalized_path.ends_with(&suffix) {
                return true;
            }
        }

        path.components()
            .filter_map(|c| c.as_os_str().to_str())
            .any(|name| self.is_dir_excluded(name))
    }
}

/// 遍历选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// 包含隐藏文件
    pub hidden: bool,
    /// 跟随符号链接；开启后链接循环作为遍历错误报告
    pub follow_links: bool,
    /// 遵循 .gitignore 规则
    pub respect_gitignore: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            hidden: true,
            follow_links: false,
            respect_gitignore: false,
        }
    }
}

/// 遍历过程中的错误，与单个文件的扫描错误分开统计
#[derive(Debug, Error)]
#[error("{message}")]
pub struct EnumerationError {
    pub path: Option<PathBuf>,
    pub message: String,
}

impl From<ignore::Error> for EnumerationError {
    fn from(err: ignore::Error) -> Self {
        Self {
            path: error_path(&err),
            message: err.to_string(),
        }
    }
}

fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::Loop { child, .. } => Some(child.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}

/// 检查扫描根目录：必须存在、是目录并且可以列出内容
///
/// 返回规范化后的绝对路径。
pub fn validate_root(root: &Path) -> Result<PathBuf, ScanError> {
    let invalid = |reason: String| ScanError::InvalidRoot {
        path: root.to_path_buf(),
        reason,
    };

    let canonical = root.canonicalize().map_err(|err| invalid(err.to_string()))?;
    if !canonical.is_dir() {
        return Err(invalid("不是目录".to_string()));
    }
    fs::read_dir(&canonical).map_err(|err| invalid(err.to_string()))?;

    Ok(canonical)
}

/// 惰性的文件遍历器
///
/// 每个实例只能消费一次；重复扫描需要重新创建。
pub struct Enumerator {
    root: PathBuf,
    walk: Walk,
    filter: Arc<FileFilter>,
    cancel: CancelToken,
}

impl Enumerator {
    pub fn new(root: &Path, options: WalkOptions, filter: FileFilter, cancel: CancelToken) -> Self {
        let filter = Arc::new(filter);

        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(!options.hidden)
            .follow_links(options.follow_links)
            .parents(options.respect_gitignore)
            .ignore(options.respect_gitignore)
            .git_global(options.respect_gitignore)
            .git_ignore(options.respect_gitignore)
            .git_exclude(options.respect_gitignore);

        // 被排除的目录整棵跳过
        let dir_filter = Arc::clone(&filter);
        builder.filter_entry(move |entry| {
            let is_dir = entry.file_type().map_or(false, |ft| ft.is_dir());
            !(is_dir
                && entry.depth() > 0
                && dir_filter.is_dir_excluded(&entry.file_name().to_string_lossy()))
        });

        Self {
            root: root.to_path_buf(),
            walk: builder.build(),
            filter,
            cancel,
        }
    }

    /// 检查条目是否应作为扫描目标
    ///
    /// 指向普通文件的符号链接总是作为目标，扫描链接指向的内容；
    /// 指向目录的链接只有开启 `follow_links` 时才会进入。
    fn accept(&self, entry: DirEntry) -> Option<ScanTarget> {
        let file_type = entry.file_type()?;
        let size = if file_type.is_file() {
            entry.metadata().ok().map(|m| m.len())
        } else if entry.path_is_symlink() {
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => Some(meta.len()),
                // 目录链接、悬空链接
                _ => return None,
            }
        } else {
            return None;
        };

        // 排除规则只作用于根目录以下的部分
        let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
        if self.filter.is_path_excluded(relative) {
            return None;
        }

        if let Some(size) = size {
            if !self.filter.matches_size(size) {
                return None;
            }
        }

        let path = entry.into_path();
        Some(match size {
            Some(size) => ScanTarget::with_size(path, size),
            None => ScanTarget::new(path),
        })
    }
}

impl Iterator for Enumerator {
    type Item = Result<ScanTarget, EnumerationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            match self.walk.next()? {
                Ok(entry) => {
                    if let Some(target) = self.accept(entry) {
                        return Some(Ok(target));
                    }
                }
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}
