use std::any::Any;
use std::fs::File;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{bounded, Receiver};

use crate::domain::aggregator::Aggregator;
use crate::domain::cancel::{CancelToken, PhaseCell, ScanPhase};
use crate::domain::outcome::{FailureKind, ScanOutcome, ScanTarget};
use crate::domain::rules::RuleMatcher;
use crate::domain::scanner::OutcomeObserver;

/// 扫描单个文件
///
/// 读取失败时不会调用匹配器。`max_bytes` 限制单次读取的字节数：
/// 遍历之后增长到超过上限的文件记为读取失败，不会整个读入内存。
pub fn scan_file(
    target: &ScanTarget,
    matcher: &dyn RuleMatcher,
    max_bytes: Option<u64>,
) -> ScanOutcome {
    let data = match read_target(target, max_bytes) {
        Ok(data) => data,
        Err(message) => return ScanOutcome::failed(target.path.clone(), FailureKind::Io, message),
    };
    let bytes = data.len() as u64;

    match panic::catch_unwind(AssertUnwindSafe(|| matcher.match_bytes(&data))) {
        Ok(Ok(rules)) => ScanOutcome::from_rules(target.path.clone(), rules, bytes),
        Ok(Err(err)) => ScanOutcome::failed(target.path.clone(), FailureKind::Match, err.to_string()),
        Err(payload) => ScanOutcome::failed(
            target.path.clone(),
            FailureKind::Match,
            panic_message(payload.as_ref()),
        ),
    }
}

// 文件句柄在返回时关闭
fn read_target(target: &ScanTarget, max_bytes: Option<u64>) -> Result<Vec<u8>, String> {
    let file = File::open(&target.path).map_err(|err| err.to_string())?;
    // 遍历时的大小只用作缓冲区容量提示
    let hint = target.size.unwrap_or(0).min(max_bytes.unwrap_or(u64::MAX));
    let mut data = Vec::with_capacity(hint as usize);

    match max_bytes {
        Some(limit) => {
            file.take(limit.saturating_add(1))
                .read_to_end(&mut data)
                .map_err(|err| err.to_string())?;
            if data.len() as u64 > limit {
                return Err(format!("文件大小超过上限 {} 字节", limit));
            }
        }
        None => {
            let mut file = file;
            file.read_to_end(&mut data).map_err(|err| err.to_string())?;
        }
    }

    Ok(data)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("匹配器崩溃: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("匹配器崩溃: {}", msg)
    } else {
        "匹配器崩溃".to_string()
    }
}

/// 工作线程共享的只读上下文
pub struct ScanContext<'a> {
    pub matcher: &'a dyn RuleMatcher,
    pub aggregator: &'a Aggregator,
    pub cancel: &'a CancelToken,
    pub observer: &'a dyn OutcomeObserver,
    pub phase: &'a PhaseCell,
    /// 单个文件允许读取的最大字节数
    pub max_bytes: Option<u64>,
}

/// 固定大小的扫描线程池
///
/// 任务通过有界队列分发，队列满时提交方阻塞，
/// 因此同时在内存中的文件数不会超过 `threads + queue_capacity`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    threads: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        Self {
            threads,
            queue_capacity: threads * 2,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// 消费所有目标直到耗尽或被取消，返回提交的任务数
    ///
    /// 返回时所有工作线程都已结束，每个已开始的任务都恰好记录了一次。
    pub fn run<I>(&self, targets: I, ctx: &ScanContext<'_>) -> u64
    where
        I: IntoIterator<Item = ScanTarget>,
    {
        let (tx, rx) = bounded::<ScanTarget>(self.queue_capacity);
        let mut submitted = 0;

        thread::scope(|s| {
            for _ in 0..self.threads {
                let rx = rx.clone();
                s.spawn(move || worker_loop(rx, ctx));
            }
            drop(rx);

            let mut targets = targets.into_iter();
            // 先检查取消再拉取下一个目标，取消后不再遍历
            while !ctx.cancel.is_cancelled() {
                let Some(target) = targets.next() else {
                    break;
                };
                if tx.send(target).is_err() {
                    break;
                }
                submitted += 1;
            }

            ctx.phase.set(ScanPhase::Draining);
            drop(tx);
        });

        submitted
    }
}

fn worker_loop(rx: Receiver<ScanTarget>, ctx: &ScanContext<'_>) {
    for target in rx.iter() {
        // 取消后丢弃还未开始的任务
        if ctx.cancel.is_cancelled() {
            continue;
        }

        let outcome = scan_file(&target, ctx.matcher, ctx.max_bytes);
        ctx.observer.on_outcome(&outcome);
        ctx.aggregator.record(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rules::{MatchError, RuleName};
    use crate::domain::scanner::NoopObserver;
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct NeedleMatcher {
        calls: AtomicUsize,
    }

    impl NeedleMatcher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RuleMatcher for NeedleMatcher {
        fn match_bytes(&self, data: &[u8]) -> Result<BTreeSet<RuleName>, MatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut hits = BTreeSet::new();
            if data.windows(6).any(|w| w == b"needle") {
                hits.insert("R1".to_string());
            }
            if data.windows(3).any(|w| w == b"hay") {
                hits.insert("R2".to_string());
            }
            Ok(hits)
        }
    }

    struct FailingMatcher;

    impl RuleMatcher for FailingMatcher {
        fn match_bytes(&self, _data: &[u8]) -> Result<BTreeSet<RuleName>, MatchError> {
            Err(MatchError("引擎内部错误".to_string()))
        }
    }

    struct PanickingMatcher;

    impl RuleMatcher for PanickingMatcher {
        fn match_bytes(&self, _data: &[u8]) -> Result<BTreeSet<RuleName>, MatchError> {
            panic!("boom")
        }
    }

    #[test]
    fn test_scan_file_outcomes() {
        let dir = tempdir().unwrap();
        let matched = dir.path().join("a.txt");
        let clean = dir.path().join("b.bin");
        fs::write(&matched, "a needle here").unwrap();
        fs::write(&clean, [0u8, 1, 2, 3]).unwrap();

        let matcher = NeedleMatcher::new();
        let outcome = scan_file(&ScanTarget::new(&matched), &matcher, None);
        match outcome {
            ScanOutcome::Matched { rules, bytes, .. } => {
                assert_eq!(rules.into_iter().collect::<Vec<_>>(), vec!["R1"]);
                assert_eq!(bytes, 13);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let outcome = scan_file(&ScanTarget::new(&clean), &matcher, None);
        assert_eq!(outcome, ScanOutcome::Clean { path: clean, bytes: 4 });
    }

    #[test]
    fn test_read_failure_skips_matcher() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("deleted.dat");

        let matcher = NeedleMatcher::new();
        let outcome = scan_file(&ScanTarget::new(&missing), &matcher, None);
        assert!(matches!(
            outcome,
            ScanOutcome::Failed { kind: FailureKind::Io, .. }
        ));
        assert_eq!(matcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_matcher_errors_become_failures() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "content").unwrap();

        let outcome = scan_file(&ScanTarget::new(&path), &FailingMatcher, None);
        assert!(matches!(
            outcome,
            ScanOutcome::Failed { kind: FailureKind::Match, ref message, .. } if message == "引擎内部错误"
        ));

        let outcome = scan_file(&ScanTarget::new(&path), &PanickingMatcher, None);
        assert!(matches!(
            outcome,
            ScanOutcome::Failed { kind: FailureKind::Match, ref message, .. } if message.contains("boom")
        ));
    }

    #[test]
    fn test_file_grown_past_limit_is_not_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grows.log");
        fs::write(&path, "needle").unwrap();
        let target = ScanTarget::with_size(&path, 6);

        // 遍历之后文件变大
        fs::write(&path, "needle and a lot more data").unwrap();

        let matcher = NeedleMatcher::new();
        let outcome = scan_file(&target, &matcher, Some(10));
        assert!(matches!(
            outcome,
            ScanOutcome::Failed { kind: FailureKind::Io, ref message, .. } if message.contains("10")
        ));
        assert_eq!(matcher.calls.load(Ordering::SeqCst), 0);

        let outcome = scan_file(&target, &matcher, Some(26));
        assert!(outcome.is_matched());
        assert_eq!(outcome.bytes(), 26);

        let outcome = scan_file(&target, &matcher, None);
        assert!(outcome.is_matched());
    }

    fn run_pool(threads: usize, targets: &[ScanTarget]) -> (u64, crate::domain::ScanReport) {
        let matcher = NeedleMatcher::new();
        let aggregator = Aggregator::new();
        let cancel = CancelToken::new();
        let phase = PhaseCell::new();
        let ctx = ScanContext {
            matcher: &matcher,
            aggregator: &aggregator,
            cancel: &cancel,
            observer: &NoopObserver,
            phase: &phase,
            max_bytes: None,
        };

        let submitted = WorkerPool::new(threads).run(targets.to_vec(), &ctx);
        assert_eq!(phase.get(), ScanPhase::Draining);
        (submitted, aggregator.finish(0, false))
    }

    #[test]
    fn test_pool_size_does_not_change_results() {
        let dir = tempdir().unwrap();
        let mut targets = Vec::new();
        for i in 0..40 {
            let path = dir.path().join(format!("file_{:02}.txt", i));
            let content = match i % 4 {
                0 => "needle",
                1 => "needle in a hay stack",
                2 => "hay",
                _ => "nothing",
            };
            fs::write(&path, content).unwrap();
            targets.push(ScanTarget::new(path));
        }
        targets.push(ScanTarget::new(dir.path().join("missing.txt")));

        let (submitted_one, single) = run_pool(1, &targets);
        let (submitted_many, parallel) = run_pool(8, &targets);

        assert_eq!(submitted_one, 41);
        assert_eq!(submitted_many, 41);

        for report in [&single, &parallel] {
            assert_eq!(report.files_scanned, 41);
            assert_eq!(report.errors, 1);
            assert_eq!(report.clean, 10);
            assert_eq!(report.matched_count(), 30);
        }

        let sorted = |report: &crate::domain::ScanReport| {
            let mut matches: Vec<(PathBuf, Vec<String>)> = report
                .matches
                .iter()
                .map(|m| (m.path.clone(), m.rules.iter().cloned().collect()))
                .collect();
            matches.sort();
            matches
        };
        assert_eq!(sorted(&single), sorted(&parallel));
        assert_eq!(single.bytes_scanned, parallel.bytes_scanned);
    }

    #[test]
    fn test_pool_defaults() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.threads(), 1);
        assert_eq!(pool.queue_capacity(), 2);
        assert_eq!(WorkerPool::new(4).with_queue_capacity(0).queue_capacity(), 1);
    }
}
