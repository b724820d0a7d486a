use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// 协作式取消标记
///
/// 克隆出的所有句柄共享同一个标志；一旦取消就不会再恢复。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 扫描运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScanPhase {
    Idle,
    /// 遍历与扫描同时进行
    Running,
    /// 遍历结束，等待在途任务完成
    Draining,
    Complete,
}

impl ScanPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ScanPhase::Idle,
            1 => ScanPhase::Running,
            2 => ScanPhase::Draining,
            _ => ScanPhase::Complete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Idle => "等待",
            ScanPhase::Running => "扫描中",
            ScanPhase::Draining => "收尾中",
            ScanPhase::Complete => "完成",
        }
    }
}

/// 可在线程间共享读取的阶段状态
#[derive(Debug, Default)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ScanPhase {
        ScanPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, phase: ScanPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}
