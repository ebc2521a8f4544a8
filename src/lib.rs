//! Probe Benchmark Library
//!
//! Priority-elevated timing probes, a label-addressed collector and an append-only
//! timings report for benchmarking long-running pipelines.

pub mod clock;
pub mod core;
pub mod error;
pub mod probe;
pub mod report;
pub mod stats;
pub mod ui;

pub use clock::{Clock, ManualClock, PriorityElevatedClock, RealTimeClock, TimeStamp};
pub use crate::core::run_benchmark;
pub use error::{BenchError, PriorityError, ProbeError, ReportError};
pub use probe::{Probe, ProbesCollector};
pub use report::{write_report, ReportFormat, ReportOptions, ReportWriter};
pub use stats::{ProbeMeasurement, ProbeStatistics};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
