// 分层架构模块
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;
pub mod error;

// 重新导出主要类型
pub use domain::{
    scan, CancelToken, FileFilter, ProgressSample, ProgressSink, RuleMatcher, RuleSet,
    ScanOptions, ScanOutcome, ScanPhase, ScanReport, Scanner,
};
pub use application::Config;
pub use error::ScanError;
pub use infrastructure::{ErrorLogger, ErrorType, Logger, LoggingObserver};
pub use presentation::{print_report, ProgressDisplay, ScanSummary};
