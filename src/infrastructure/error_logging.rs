use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;

use crate::domain::FailureKind;

/// 错误类型分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorType {
    /// 目录遍历错误
    Enumeration,
    /// 文件读取错误
    FileRead,
    /// 规则匹配错误
    Match,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Enumeration => "目录遍历",
            ErrorType::FileRead => "文件读取",
            ErrorType::Match => "规则匹配",
        }
    }
}

impl From<FailureKind> for ErrorType {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Io => ErrorType::FileRead,
            FailureKind::Match => ErrorType::Match,
        }
    }
}

/// 错误日志记录器
///
/// 即使未启用文件输出也会统计各类错误的数量。
pub struct ErrorLogger {
    error_file: Mutex<Option<File>>,
    error_path: PathBuf,
    enabled: bool,
    error_counts: Mutex<HashMap<ErrorType, usize>>,
}

impl ErrorLogger {
    /// 创建新的错误日志记录器，日志文件写在当前目录
    pub fn new(enabled: bool) -> Result<Self> {
        if !enabled {
            return Ok(Self {
                error_file: Mutex::new(None),
                error_path: PathBuf::new(),
                enabled: false,
                error_counts: Mutex::new(HashMap::new()),
            });
        }
        Self::in_dir(Path::new("."))
    }

    /// 在指定目录创建错误日志文件
    pub fn in_dir(dir: &Path) -> Result<Self> {
        let now = Local::now();
        let error_path = dir.join(format!("error_{}.log", now.format("%Y%m%d_%H%M%S")));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&error_path)
            .with_context(|| format!("无法创建错误日志文件: {}", error_path.display()))?;

        // 写入UTF-8 BOM以确保文件被正确识别为UTF-8
        file.write_all(&[0xEF, 0xBB, 0xBF])?;
        writeln!(file, "# ScanEverything 错误日志")?;
        writeln!(file, "# 开始时间: {}", now.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(file, "# ============================================")?;
        writeln!(file)?;

        Ok(Self {
            error_file: Mutex::new(Some(file)),
            error_path,
            enabled: true,
            error_counts: Mutex::new(HashMap::new()),
        })
    }

    /// 记录错误
    pub fn log_error(
        &self,
        error_type: ErrorType,
        file_path: Option<&Path>,
        message: &str,
    ) -> Result<()> {
        if let Ok(mut counts) = self.error_counts.lock() {
            *counts.entry(error_type).or_insert(0) += 1;
        }

        if !self.enabled {
            return Ok(());
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");

        if let Ok(mut file_guard) = self.error_file.lock() {
            if let Some(ref mut file) = *file_guard {
                writeln!(file, "[{}] {} - {}", timestamp, error_type.as_str(), message)?;

                if let Some(path) = file_path {
                    writeln!(file, "  文件路径: {}", path.display())?;
                }

                writeln!(file)?;
                file.flush()?;
            }
        }

        Ok(())
    }

    /// 获取错误统计信息
    pub fn get_error_summary(&self) -> HashMap<ErrorType, usize> {
        if let Ok(counts) = self.error_counts.lock() {
            counts.clone()
        } else {
            HashMap::new()
        }
    }

    /// 获取总错误数
    pub fn get_total_errors(&self) -> usize {
        self.get_error_summary().values().sum()
    }

    /// 检查是否有错误
    pub fn has_errors(&self) -> bool {
        self.get_total_errors() > 0
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn error_path(&self) -> &Path {
        &self.error_path
    }

    fn sorted_summary(&self) -> Vec<(ErrorType, usize)> {
        let mut summary: Vec<_> = self.get_error_summary().into_iter().collect();
        summary.sort();
        summary
    }

    /// 完成错误日志记录
    pub fn finalize(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if let Ok(mut file_guard) = self.error_file.lock() {
            if let Some(ref mut file) = *file_guard {
                let now = Local::now();
                writeln!(file, "# ============================================")?;
                writeln!(file, "# 结束时间: {}", now.format("%Y-%m-%d %H:%M:%S"))?;

                let summary = self.sorted_summary();
                if !summary.is_empty() {
                    writeln!(file, "# 错误统计:")?;
                    for (error_type, count) in &summary {
                        writeln!(file, "#   {}: {} 次", error_type.as_str(), count)?;
                    }
                    writeln!(file, "#   总计: {} 个错误", self.get_total_errors())?;
                } else {
                    writeln!(file, "# 无错误记录")?;
                }

                file.flush()?;
            }
        }

        Ok(())
    }

    /// 打印错误摘要到控制台
    pub fn print_error_summary(&self) {
        if !self.has_errors() {
            return;
        }

        println!("\n⚠️  扫描过程中发现错误:");
        println!("----------------------------");

        for (error_type, count) in self.sorted_summary() {
            println!("  {}: {} 次", error_type.as_str(), count);
        }

        println!("  总计: {} 个错误", self.get_total_errors());
        if self.enabled {
            println!("  详细错误信息请查看: {}", self.error_path.display());
        } else {
            println!("  使用 --log 查看每个文件的错误详情");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_error_logger_creation() {
        let logger = ErrorLogger::new(false).unwrap();
        assert_eq!(logger.get_total_errors(), 0);
        assert!(!logger.is_enabled());
    }

    #[test]
    fn test_disabled_logger_still_counts() {
        let logger = ErrorLogger::new(false).unwrap();
        logger
            .log_error(ErrorType::Match, Some(Path::new("/x")), "boom")
            .unwrap();
        assert_eq!(logger.get_total_errors(), 1);
    }

    #[test]
    fn test_error_logging() {
        let dir = tempdir().unwrap();
        let logger = ErrorLogger::in_dir(dir.path()).unwrap();

        logger
            .log_error(ErrorType::FileRead, Some(Path::new("/test/path")), "权限不足")
            .unwrap();
        logger
            .log_error(ErrorType::Enumeration, None, "符号链接循环")
            .unwrap();

        assert_eq!(logger.get_total_errors(), 2);
        assert!(logger.has_errors());

        let summary = logger.get_error_summary();
        assert_eq!(summary.get(&ErrorType::FileRead), Some(&1));
        assert_eq!(summary.get(&ErrorType::Enumeration), Some(&1));

        logger.finalize().unwrap();
        let content = fs::read_to_string(logger.error_path()).unwrap();
        assert!(content.contains("/test/path"));
        assert!(content.contains("总计: 2 个错误"));
    }

    #[test]
    fn test_error_types() {
        assert_eq!(ErrorType::FileRead.as_str(), "文件读取");
        assert_eq!(ErrorType::from(FailureKind::Io), ErrorType::FileRead);
        assert_eq!(ErrorType::from(FailureKind::Match), ErrorType::Match);
    }
}
