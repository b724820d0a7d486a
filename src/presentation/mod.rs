pub mod display;

pub use display::{print_report, ProgressDisplay, ScanSummary};
