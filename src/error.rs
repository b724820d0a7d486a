use std::path::PathBuf;

use thiserror::Error;

use crate::domain::rules::CompileError;

/// 使整个扫描无法开始的致命错误
///
/// 单个文件的读取或匹配错误不在此列，它们作为扫描结果记录。
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("规则编译失败: {0}")]
    Compile(#[from] CompileError),

    #[error("无法访问扫描目录 {}: {reason}", path.display())]
    InvalidRoot { path: PathBuf, reason: String },
}
