use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::domain::outcome::ScanOutcome;
use crate::domain::rules::RuleName;

/// 一个命中文件及其命中的规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub path: PathBuf,
    pub rules: BTreeSet<RuleName>,
}

/// 扫描期间的可变状态，只能通过 `Aggregator::record` 修改
#[derive(Debug, Default)]
struct ScanState {
    files_scanned: u64,
    errors: u64,
    clean: u64,
    bytes_scanned: u64,
    /// 按完成顺序追加
    matches: Vec<MatchRecord>,
}

impl ScanState {
    fn apply(&mut self, outcome: ScanOutcome) {
        self.files_scanned += 1;
        self.bytes_scanned += outcome.bytes();
        match outcome {
            ScanOutcome::Matched { path, rules, .. } => {
                self.matches.push(MatchRecord { path, rules });
            }
            ScanOutcome::Clean { .. } => self.clean += 1,
            ScanOutcome::Failed { .. } => self.errors += 1,
        }
    }
}

/// 不含命中列表的计数快照，供进度刷新使用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressCounts {
    pub files_scanned: u64,
    pub errors: u64,
    pub clean: u64,
    pub matched: u64,
    pub bytes_scanned: u64,
    pub elapsed: Duration,
}

/// 某一时刻的一致性快照
#[derive(Debug, Clone)]
pub struct AggregatorSnapshot {
    pub files_scanned: u64,
    pub errors: u64,
    pub clean: u64,
    pub bytes_scanned: u64,
    pub matches: Vec<MatchRecord>,
    pub elapsed: Duration,
}

impl AggregatorSnapshot {
    pub fn match_count(&self) -> u64 {
        self.matches.len() as u64
    }

    /// files_scanned == errors + matched + clean
    pub fn is_consistent(&self) -> bool {
        self.files_scanned == self.errors + self.match_count() + self.clean
    }
}

/// 扫描结束后冻结的最终结果
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub files_scanned: u64,
    pub errors: u64,
    pub clean: u64,
    pub bytes_scanned: u64,
    pub matches: Vec<MatchRecord>,
    pub elapsed: Duration,
    /// 遍历阶段的错误数，不计入 `errors`
    pub enumeration_errors: u64,
    /// 运行是否因取消而提前结束
    pub cancelled: bool,
}

impl ScanReport {
    pub fn matched_count(&self) -> u64 {
        self.matches.len() as u64
    }
}

/// 扫描状态的唯一持有者
///
/// 所有工作线程通过 `record` 串行地提交结果；
/// 读取方只能拿到快照。
#[derive(Debug)]
pub struct Aggregator {
    state: Mutex<ScanState>,
    start_time: Instant,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScanState::default()),
            start_time: Instant::now(),
        }
    }

    // 锁中毒时继续使用内部状态
    fn lock(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 原子地记录一个扫描结果
    pub fn record(&self, outcome: ScanOutcome) {
        self.lock().apply(outcome);
    }

    /// 只读取计数器，锁持有时间很短
    pub fn progress(&self) -> ProgressCounts {
        let state = self.lock();
        ProgressCounts {
            files_scanned: state.files_scanned,
            errors: state.errors,
            clean: state.clean,
            matched: state.matches.len() as u64,
            bytes_scanned: state.bytes_scanned,
            elapsed: self.start_time.elapsed(),
        }
    }

    /// 完整快照，包含目前为止的所有命中
    ///
    /// 会复制整个命中列表，用于按需读取；周期性的进度刷新使用 `progress`。
    pub fn snapshot(&self) -> AggregatorSnapshot {
        let state = self.lock();
        AggregatorSnapshot {
            files_scanned: state.files_scanned,
            errors: state.errors,
            clean: state.clean,
            bytes_scanned: state.bytes_scanned,
            matches: state.matches.clone(),
            elapsed: self.start_time.elapsed(),
        }
    }

    /// 冻结状态，生成最终报告
    pub fn finish(self, enumeration_errors: u64, cancelled: bool) -> ScanReport {
        let elapsed = self.start_time.elapsed();
        let state = self.state.into_inner().unwrap_or_else(PoisonError::into_inner);
        ScanReport {
            files_scanned: state.files_scanned,
            errors: state.errors,
            clean: state.clean,
            bytes_scanned: state.bytes_scanned,
            matches: state.matches,
            elapsed,
            enumeration_errors,
            cancelled,
        }
    }
}
