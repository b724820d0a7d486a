use std::time::Duration;

use crossbeam_channel::{select, tick, Receiver};

use crate::domain::aggregator::{Aggregator, ProgressCounts};
use crate::domain::cancel::{PhaseCell, ScanPhase};

/// 默认刷新间隔，每秒 10 次
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// 推送给展示层的进度样本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    pub files_scanned: u64,
    pub errors: u64,
    pub matched: u64,
    pub bytes_scanned: u64,
    pub elapsed: Duration,
    pub phase: ScanPhase,
    /// 文件总数，扫描结束前未知
    pub total: Option<u64>,
    pub complete: bool,
}

impl ProgressSample {
    fn from_counts(counts: ProgressCounts, phase: ScanPhase) -> Self {
        Self {
            files_scanned: counts.files_scanned,
            errors: counts.errors,
            matched: counts.matched,
            bytes_scanned: counts.bytes_scanned,
            elapsed: counts.elapsed,
            phase,
            total: None,
            complete: false,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// 进度展示接口
pub trait ProgressSink: Send + Sync {
    /// 扫描期间按固定间隔调用
    fn update(&self, sample: &ProgressSample);
    /// 扫描结束时调用一次，`sample.complete` 为 true
    fn finish(&self, sample: &ProgressSample);
}

/// 丢弃所有进度的空实现
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn update(&self, _sample: &ProgressSample) {}
    fn finish(&self, _sample: &ProgressSample) {}
}

/// 周期性采样聚合器状态并转发给展示层
#[derive(Debug, Clone, Copy)]
pub struct ProgressReporter {
    interval: Duration,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}

impl ProgressReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 采样一次当前进度
    pub fn sample(aggregator: &Aggregator, phase: &PhaseCell) -> ProgressSample {
        ProgressSample::from_counts(aggregator.progress(), phase.get())
    }

    /// 扫描结束后的最终样本，总数确定为已扫描文件数
    pub fn final_sample(aggregator: &Aggregator) -> ProgressSample {
        let counts = aggregator.progress();
        ProgressSample {
            total: Some(counts.files_scanned),
            complete: true,
            ..ProgressSample::from_counts(counts, ScanPhase::Complete)
        }
    }

    /// 按间隔采样，直到 `stop` 的发送端被关闭，然后发送最终样本
    ///
    /// 采样只读取计数器，不会阻塞工作线程。
    pub fn run(
        &self,
        aggregator: &Aggregator,
        phase: &PhaseCell,
        sink: &dyn ProgressSink,
        stop: Receiver<()>,
    ) {
        let ticker = tick(self.interval);
        loop {
            select! {
                recv(stop) -> _ => break,
                recv(ticker) -> _ => sink.update(&Self::sample(aggregator, phase)),
            }
        }

        sink.finish(&Self::final_sample(aggregator));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::{FailureKind, ScanOutcome};
    use crossbeam_channel::bounded;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::thread;

    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<ProgressSample>>,
        finished: Mutex<Vec<ProgressSample>>,
    }

    impl ProgressSink for RecordingSink {
        fn update(&self, sample: &ProgressSample) {
            self.updates.lock().unwrap().push(*sample);
        }

        fn finish(&self, sample: &ProgressSample) {
            self.finished.lock().unwrap().push(*sample);
        }
    }

    #[test]
    fn test_final_sample_has_total() {
        let aggregator = Aggregator::new();
        aggregator.record(ScanOutcome::from_rules("a".into(), BTreeSet::new(), 1));
        aggregator.record(ScanOutcome::failed("b".into(), FailureKind::Io, "x"));

        let sample = ProgressReporter::final_sample(&aggregator);
        assert!(sample.complete);
        assert_eq!(sample.total, Some(2));
        assert_eq!(sample.errors, 1);
        assert_eq!(sample.phase, ScanPhase::Complete);
    }

    #[test]
    fn test_reporter_samples_until_stopped() {
        let aggregator = Aggregator::new();
        let phase = PhaseCell::new();
        phase.set(ScanPhase::Running);
        let sink = RecordingSink::default();
        let reporter = ProgressReporter::new(Duration::from_millis(5));
        let (stop_tx, stop_rx) = bounded::<()>(0);

        thread::scope(|s| {
            s.spawn(|| reporter.run(&aggregator, &phase, &sink, stop_rx));

            for i in 0..20 {
                aggregator.record(ScanOutcome::from_rules(
                    format!("f{}", i).into(),
                    BTreeSet::new(),
                    1,
                ));
                thread::sleep(Duration::from_millis(5));
            }
            drop(stop_tx);
        });

        let updates = sink.updates.lock().unwrap();
        assert!(!updates.is_empty());
        assert!(updates.iter().all(|u| !u.complete && u.total.is_none()));
        assert!(updates
            .windows(2)
            .all(|w| w[0].files_scanned <= w[1].files_scanned));

        let finished = sink.finished.lock().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].total, Some(20));
        assert_eq!(finished[0].files_scanned, 20);
    }
}
