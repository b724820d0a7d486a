use std::sync::Arc;

use crate::domain::{EnumerationError, OutcomeObserver, ScanOutcome};
use crate::infrastructure::{ErrorLogger, ErrorType, Logger, LoggerTrait};

/// 把扫描事件写入调试日志和错误日志
///
/// 日志写入失败会被忽略，不影响扫描。
pub struct LoggingObserver {
    logger: Arc<Logger>,
    error_logger: Arc<ErrorLogger>,
}

impl LoggingObserver {
    pub fn new(logger: Arc<Logger>, error_logger: Arc<ErrorLogger>) -> Self {
        Self {
            logger,
            error_logger,
        }
    }
}

impl OutcomeObserver for LoggingObserver {
    fn on_outcome(&self, outcome: &ScanOutcome) {
        match outcome {
            ScanOutcome::Matched { path, rules, bytes } => {
                if self.logger.is_enabled() {
                    let names: Vec<&str> = rules.iter().map(String::as_str).collect();
                    let _ = self
                        .logger
                        .log_file(path, *bytes, &format!("命中: {}", names.join(", ")));
                }
            }
            ScanOutcome::Clean { path, bytes } => {
                if self.logger.is_enabled() {
                    let _ = self.logger.log_file(path, *bytes, "无命中");
                }
            }
            ScanOutcome::Failed {
                path,
                kind,
                message,
            } => {
                let _ = self
                    .error_logger
                    .log_error(ErrorType::from(*kind), Some(path.as_path()), message);
                if self.logger.is_enabled() {
                    let _ = self
                        .logger
                        .log_file(path, 0, &format!("错误({}): {}", kind, message));
                }
            }
        }
    }

    fn on_enumeration_error(&self, error: &EnumerationError) {
        let _ = self.error_logger.log_error(
            ErrorType::Enumeration,
            error.path.as_deref(),
            &error.message,
        );
        if self.logger.is_enabled() {
            let _ = self.logger.log_message(&format!("遍历错误: {}", error));
        }
    }
}
