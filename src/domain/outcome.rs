use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::rules::RuleName;

/// 待扫描的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub path: PathBuf,
    /// 遍历时得到的文件大小（如果可用）
    pub size: Option<u64>,
}

impl ScanTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: None,
        }
    }

    pub fn with_size(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size: Some(size),
        }
    }
}

/// 单个文件扫描失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 文件无法读取
    Io,
    /// 匹配器内部错误
    Match,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Io => f.write_str("文件读取"),
            FailureKind::Match => f.write_str("规则匹配"),
        }
    }
}

/// 单个文件的扫描结果，每个被遍历到的文件恰好产生一个
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// 命中至少一条规则
    Matched {
        path: PathBuf,
        rules: BTreeSet<RuleName>,
        bytes: u64,
    },
    /// 匹配器已运行，没有命中
    Clean { path: PathBuf, bytes: u64 },
    /// 读取失败或匹配器出错
    Failed {
        path: PathBuf,
        kind: FailureKind,
        message: String,
    },
}

impl ScanOutcome {
    /// 根据匹配结果构造 `Matched` 或 `Clean`
    pub fn from_rules(path: PathBuf, rules: BTreeSet<RuleName>, bytes: u64) -> Self {
        if rules.is_empty() {
            ScanOutcome::Clean { path, bytes }
        } else {
            ScanOutcome::Matched { path, rules, bytes }
        }
    }

    pub fn failed(path: PathBuf, kind: FailureKind, message: impl Into<String>) -> Self {
        ScanOutcome::Failed {
            path,
            kind,
            message: message.into(),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ScanOutcome::Matched { path, .. }
            | ScanOutcome::Clean { path, .. }
            | ScanOutcome::Failed { path, .. } => path,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ScanOutcome::Failed { .. })
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, ScanOutcome::Matched { .. })
    }

    /// 成功读取的字节数，失败时为 0
    pub fn bytes(&self) -> u64 {
        match self {
            ScanOutcome::Matched { bytes, .. } | ScanOutcome::Clean { bytes, .. } => *bytes,
            ScanOutcome::Failed { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rules() {
        let clean = ScanOutcome::from_rules(PathBuf::from("a"), BTreeSet::new(), 10);
        assert_eq!(
            clean,
            ScanOutcome::Clean {
                path: PathBuf::from("a"),
                bytes: 10
            }
        );

        let rules: BTreeSet<RuleName> = ["R1".to_string()].into_iter().collect();
        let matched = ScanOutcome::from_rules(PathBuf::from("b"), rules, 3);
        assert!(matched.is_matched());
        assert_eq!(matched.path(), Path::new("b"));
        assert_eq!(matched.bytes(), 3);
    }

    #[test]
    fn test_failed() {
        let failed = ScanOutcome::failed(PathBuf::from("c"), FailureKind::Io, "denied");
        assert!(failed.is_failed());
        assert_eq!(failed.bytes(), 0);
        assert_eq!(FailureKind::Io.to_string(), "文件读取");
    }
}
