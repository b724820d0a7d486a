pub mod aggregator;
pub mod cancel;
pub mod file_walker;
pub mod outcome;
pub mod progress;
pub mod rules;
pub mod scanner;
pub mod worker;

pub use aggregator::{Aggregator, AggregatorSnapshot, MatchRecord, ScanReport};
pub use cancel::{CancelToken, ScanPhase};
pub use file_walker::{validate_root, EnumerationError, Enumerator, FileFilter, WalkOptions};
pub use outcome::{FailureKind, ScanOutcome, ScanTarget};
pub use progress::{NullSink, ProgressReporter, ProgressSample, ProgressSink};
pub use rules::{CompileError, MatchError, RuleMatcher, RuleName, RuleSet};
pub use scanner::{scan, NoopObserver, OutcomeObserver, ScanOptions, Scanner};
pub use worker::{scan_file, WorkerPool};
