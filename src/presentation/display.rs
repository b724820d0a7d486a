use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use crate::domain::{ProgressSample, ProgressSink, ScanReport};

/// 格式化持续时间
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}.{:03}s", secs, duration.subsec_millis())
    }
}

/// 格式化文件大小
pub fn format_file_size(size: u64) -> String {
    format_size(size, BINARY)
}

/// 把过长的路径截断为以 "..." 开头的尾部
pub fn truncate_path(path: &str, max_width: usize) -> String {
    let count = path.chars().count();
    if count <= max_width {
        return path.to_string();
    }
    let keep = max_width.saturating_sub(3);
    let tail: String = path.chars().skip(count - keep).collect();
    format!("...{}", tail)
}

fn progress_message(sample: &ProgressSample) -> String {
    format!(
        "{} | 已扫描 {} 文件, {} 个错误, {} 个命中 | 已用时 {:.2} 秒",
        sample.phase.as_str(),
        sample.files_scanned,
        sample.errors,
        sample.matched,
        sample.elapsed_secs()
    )
}

/// 终端进度显示
///
/// 扫描过程中总数未知，显示为旋转指示器；结束时切换为完整进度条。
pub struct ProgressDisplay {
    progress: ProgressBar,
}

impl ProgressDisplay {
    pub fn new() -> Self {
        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        progress.set_message("正在扫描...");
        Self { progress }
    }

    /// 不输出到终端，用于测试
    pub fn hidden() -> Self {
        Self {
            progress: ProgressBar::hidden(),
        }
    }

    pub fn position(&self) -> u64 {
        self.progress.position()
    }

    pub fn length(&self) -> Option<u64> {
        self.progress.length()
    }

    pub fn is_finished(&self) -> bool {
        self.progress.is_finished()
    }
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ProgressDisplay {
    fn update(&self, sample: &ProgressSample) {
        self.progress.set_position(sample.files_scanned);
        self.progress.set_message(progress_message(sample));
        self.progress.tick();
    }

    fn finish(&self, sample: &ProgressSample) {
        let total = sample.total.unwrap_or(sample.files_scanned);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            self.progress.set_style(style);
        }
        self.progress.set_length(total);
        self.progress.set_position(sample.files_scanned);
        self.progress.finish_with_message(progress_message(sample));
    }
}

/// 扫描摘要
pub struct ScanSummary<'a> {
    pub report: &'a ScanReport,
}

impl<'a> ScanSummary<'a> {
    pub fn new(report: &'a ScanReport) -> Self {
        Self { report }
    }

    pub fn print(&self) -> Result<()> {
        let mut stdout = io::stdout().lock();
        self.write_to(&mut stdout)
    }

    pub fn write_to(&self, out: &mut impl Write) -> Result<()> {
        let report = self.report;

        writeln!(out)?;
        if report.cancelled {
            writeln!(out, "扫描已取消，以下为部分结果。")?;
        } else {
            writeln!(out, "扫描完成!")?;
        }
        writeln!(out, "----------------------------")?;
        writeln!(out, "总用时: {}", format_duration(report.elapsed))?;
        writeln!(out, "扫描文件: {}", report.files_scanned)?;
        writeln!(out, "读取数据: {}", format_file_size(report.bytes_scanned))?;
        writeln!(out, "错误文件: {}", report.errors)?;
        writeln!(out, "命中文件: {}", report.matched_count())?;
        if report.enumeration_errors > 0 {
            writeln!(out, "遍历错误: {}", report.enumeration_errors)?;
        }

        Ok(())
    }
}

/// 输出命中结果表
pub fn print_report(report: &ScanReport, max_path_width: usize) -> Result<()> {
    let mut stdout = io::stdout().lock();
    write_report(&mut stdout, report, max_path_width)
}

pub fn write_report(out: &mut impl Write, report: &ScanReport, max_path_width: usize) -> Result<()> {
    if report.matches.is_empty() {
        writeln!(out, "\n\x1b[1;32m未发现命中。\x1b[0m")?;
        return Ok(());
    }

    let rows: Vec<(String, String)> = report
        .matches
        .iter()
        .map(|m| {
            let path = truncate_path(&m.path.to_string_lossy(), max_path_width);
            let rules = m.rules.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
            (path, rules)
        })
        .collect();

    let path_width = rows
        .iter()
        .map(|(p, _)| p.chars().count())
        .max()
        .unwrap_or(0)
        .max("文件路径".chars().count());

    writeln!(out, "\n规则命中 ({} 个文件)", rows.len())?;
    writeln!(out, "{:<width$}  规则名称", "文件路径", width = path_width)?;
    writeln!(out, "{}", "-".repeat(path_width + 12))?;
    for (path, rules) in rows {
        writeln!(
            out,
            "\x1b[2m{:<width$}\x1b[0m  \x1b[1;35m{}\x1b[0m",
            path,
            rules,
            width = path_width
        )?;
    }

    Ok(())
}
