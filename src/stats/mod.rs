//! Interval statistics.

pub mod probe_measurement;
pub mod probe_statistics;

pub use probe_measurement::ProbeMeasurement;
pub use probe_statistics::ProbeStatistics;
