use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;

use crate::domain::aggregator::{Aggregator, ScanReport};
use crate::domain::cancel::{CancelToken, PhaseCell, ScanPhase};
use crate::domain::file_walker::{validate_root, EnumerationError, Enumerator, FileFilter, WalkOptions};
use crate::domain::outcome::{ScanOutcome, ScanTarget};
use crate::domain::progress::{ProgressReporter, ProgressSink, DEFAULT_PROGRESS_INTERVAL};
use crate::domain::rules::{RuleMatcher, RuleSet};
use crate::domain::worker::{ScanContext, WorkerPool};
use crate::error::ScanError;

/// 扫描过程中的事件回调，默认什么都不做
///
/// 回调在工作线程或遍历线程上执行，应当尽快返回。
pub trait OutcomeObserver: Send + Sync {
    fn on_outcome(&self, _outcome: &ScanOutcome) {}
    fn on_enumeration_error(&self, _error: &EnumerationError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl OutcomeObserver for NoopObserver {}

/// 扫描参数
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// 工作线程数，至少为 1
    pub threads: usize,
    /// 等待扫描的任务队列容量
    pub queue_capacity: usize,
    pub progress_interval: Duration,
    pub walk: WalkOptions,
    pub filter: FileFilter,
}

impl Default for ScanOptions {
    fn default() -> Self {
        let threads = num_cpus::get().max(1);
        Self {
            threads,
            queue_capacity: threads * 2,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            walk: WalkOptions::default(),
            filter: FileFilter::default(),
        }
    }
}

/// 扫描器：持有已编译的规则，负责每次扫描的完整生命周期
///
/// Idle → Running → Draining → Complete
///
/// 同一个扫描器可以多次运行。每次运行使用当时的取消标记，
/// 运行结束后换上新的标记，被取消的运行不会影响下一次。
pub struct Scanner {
    matcher: Arc<dyn RuleMatcher>,
    options: ScanOptions,
    phase: PhaseCell,
    cancel: Mutex<CancelToken>,
}

impl Scanner {
    pub fn new(matcher: Arc<dyn RuleMatcher>, options: ScanOptions) -> Self {
        Self {
            matcher,
            options,
            phase: PhaseCell::new(),
            cancel: Mutex::new(CancelToken::new()),
        }
    }

    /// 编译规则文件并创建扫描器，编译失败时不会进入扫描
    pub fn from_rules_file(rules_path: &Path, options: ScanOptions) -> Result<Self, ScanError> {
        let rules = RuleSet::compile_file(rules_path)?;
        Ok(Self::new(Arc::new(rules), options))
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    fn cancel_slot(&self) -> MutexGuard<'_, CancelToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 下一次（或正在进行的）运行的取消句柄，可以交给信号处理函数
    ///
    /// 句柄只对一次运行有效；运行结束后需要重新获取。
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel_slot().clone()
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase.get()
    }

    /// 扫描目录树
    ///
    /// 只有根目录无法访问时返回错误；单个文件的失败记录在报告里。
    pub fn run(
        &self,
        root: &Path,
        sink: &dyn ProgressSink,
        observer: &dyn OutcomeObserver,
    ) -> Result<ScanReport, ScanError> {
        let root = validate_root(root)?;
        let cancel = self.cancel_token();

        let enumeration_errors = AtomicU64::new(0);
        let enumerator = Enumerator::new(
            &root,
            self.options.walk,
            self.options.filter.clone(),
            cancel.clone(),
        );
        // 遍历错误在带外报告，不进入扫描结果
        let targets = enumerator.filter_map(|item| match item {
            Ok(target) => Some(target),
            Err(err) => {
                enumeration_errors.fetch_add(1, Ordering::Relaxed);
                observer.on_enumeration_error(&err);
                None
            }
        });

        let mut report = self.execute(targets, sink, observer, &cancel);
        report.enumeration_errors = enumeration_errors.load(Ordering::Relaxed);
        Ok(report)
    }

    /// 扫描给定的目标序列
    pub fn run_targets<I>(
        &self,
        targets: I,
        sink: &dyn ProgressSink,
        observer: &dyn OutcomeObserver,
    ) -> ScanReport
    where
        I: IntoIterator<Item = ScanTarget>,
    {
        let cancel = self.cancel_token();
        self.execute(targets, sink, observer, &cancel)
    }

    fn execute<I>(
        &self,
        targets: I,
        sink: &dyn ProgressSink,
        observer: &dyn OutcomeObserver,
        cancel: &CancelToken,
    ) -> ScanReport
    where
        I: IntoIterator<Item = ScanTarget>,
    {
        let aggregator = Aggregator::new();
        let pool = WorkerPool::new(self.options.threads)
            .with_queue_capacity(self.options.queue_capacity);
        let reporter = ProgressReporter::new(self.options.progress_interval);
        let (stop_tx, stop_rx) = bounded::<()>(0);

        self.phase.set(ScanPhase::Running);

        thread::scope(|s| {
            s.spawn(|| reporter.run(&aggregator, &self.phase, sink, stop_rx));

            let ctx = ScanContext {
                matcher: self.matcher.as_ref(),
                aggregator: &aggregator,
                cancel,
                observer,
                phase: &self.phase,
                max_bytes: self.options.filter.max_size,
            };
            pool.run(targets, &ctx);

            self.phase.set(ScanPhase::Complete);
            drop(stop_tx);
        });

        let cancelled = cancel.is_cancelled();
        // 本次运行的标记到此失效
        *self.cancel_slot() = CancelToken::new();

        aggregator.finish(0, cancelled)
    }
}

/// 编译规则并扫描目录的便捷函数
pub fn scan(
    rules_path: &Path,
    root: &Path,
    options: ScanOptions,
    sink: &dyn ProgressSink,
) -> Result<ScanReport, ScanError> {
    Scanner::from_rules_file(rules_path, options)?.run(root, sink, &NoopObserver)
}
