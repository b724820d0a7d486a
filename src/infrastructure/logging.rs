use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;

/// 日志记录器trait
pub trait LoggerTrait: Send + Sync {
    fn is_enabled(&self) -> bool;
    fn log_message(&self, message: &str) -> Result<()>;
    fn log_file(&self, path: &Path, size: u64, status: &str) -> Result<()>;
    fn finalize(&self, files_scanned: u64, errors: u64, matched_files: u64, duration: Duration) -> Result<()>;
}

/// 调试日志记录器（扫描参数、逐文件状态和摘要）
pub struct Logger {
    log_file: Mutex<Option<File>>,
    log_path: PathBuf,
    enabled: bool,
}

impl Logger {
    /// 创建新的日志记录器，日志文件写在当前目录
    pub fn new(enabled: bool) -> Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }
        Self::in_dir(Path::new("."))
    }

    /// 在指定目录创建日志文件
    pub fn in_dir(dir: &Path) -> Result<Self> {
        let now = Local::now();
        let log_path = dir.join(format!("debug_{}.log", now.format("%Y%m%d_%H%M%S")));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("无法创建日志文件: {}", log_path.display()))?;

        // 写入UTF-8 BOM以确保文件被正确识别为UTF-8
        file.write_all(&[0xEF, 0xBB, 0xBF])?;
        writeln!(file, "# ScanEverything 调试日志")?;
        writeln!(file, "# 开始时间: {}", now.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(file, "# --------------------------------------------")?;

        Ok(Self {
            log_file: Mutex::new(Some(file)),
            log_path,
            enabled: true,
        })
    }

    fn disabled() -> Self {
        Self {
            log_file: Mutex::new(None),
            log_path: PathBuf::new(),
            enabled: false,
        }
    }

    /// 获取日志文件路径
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn write_line(&self, line: std::fmt::Arguments<'_>) -> Result<()> {
        if let Ok(mut file_guard) = self.log_file.lock() {
            if let Some(ref mut file) = *file_guard {
                file.write_fmt(line)?;
                file.write_all(b"\n")?;
                file.flush()?;
            }
        }
        Ok(())
    }
}

impl LoggerTrait for Logger {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn log_message(&self, message: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        self.write_line(format_args!("[{}] {}", timestamp, message))
    }

    fn log_file(&self, path: &Path, size: u64, status: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        self.write_line(format_args!(
            "[{}] 文件: {} | 大小: {} 字节 | 状态: {}",
            timestamp,
            path.display(),
            size,
            status
        ))
    }

    fn finalize(&self, files_scanned: u64, errors: u64, matched_files: u64, duration: Duration) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let now = Local::now();
        self.write_line(format_args!("# --------------------------------------------"))?;
        self.write_line(format_args!("# 扫描完成时间: {}", now.format("%Y-%m-%d %H:%M:%S")))?;
        self.write_line(format_args!("# 总用时: {:.3}秒", duration.as_secs_f64()))?;
        self.write_line(format_args!("# 扫描文件数: {}", files_scanned))?;
        self.write_line(format_args!("# 错误数: {}", errors))?;
        self.write_line(format_args!("# 命中文件数: {}", matched_files))?;
        self.write_line(format_args!("# ============================================"))?;

        println!("完整日志已保存到: {}", self.log_path.display());
        Ok(())
    }
}
