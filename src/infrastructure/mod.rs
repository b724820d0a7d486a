pub mod logging;
pub mod error_logging;
pub mod scan_log;

pub use logging::{Logger, LoggerTrait};
pub use error_logging::{ErrorLogger, ErrorType};
pub use scan_log::LoggingObserver;
