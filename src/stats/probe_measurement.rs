//! Labeled snapshot of one probe, as handed to reporting.

use serde::Serialize;

use crate::stats::probe_statistics::ProbeStatistics;

/// Statistics and raw per-iteration durations of one label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeMeasurement {
    pub label: String,
    pub statistics: ProbeStatistics,
    pub samples: Vec<f64>,
}
