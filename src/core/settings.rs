//! Benchmark settings file
//!
//! Read from `benchsettings.json` (or the path given on the command line).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::BenchError;
use crate::report::{ReportFormat, ReportOptions};

pub const DEFAULT_SETTINGS_FILE: &str = "benchsettings.json";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BenchmarkSettings {
    /// Report path template; `__DATESTAMP__` becomes the run date.
    #[serde(rename = "TimingsFile")]
    pub timings_file: String,
    #[serde(rename = "Iterations", deserialize_with = "validate_positive_u32")]
    pub iterations: u32,
    /// Global worker count; zero or negative keeps the platform default.
    #[serde(rename = "Threads", default)]
    pub threads: i32,
    #[serde(rename = "Workload")]
    pub workload: WorkloadSettings,
    #[serde(rename = "ExpandedFormat", default = "enabled")]
    pub expanded_format: bool,
    #[serde(rename = "IncludeSystemInfo", default = "enabled")]
    pub include_system_info: bool,
    #[serde(rename = "IncludePerLabelDetail", default)]
    pub include_per_label_detail: bool,
    #[serde(rename = "Format", default)]
    pub format: ReportFormatSetting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "Kind")]
pub enum WorkloadSettings {
    /// Fixed arithmetic spread across the worker pool.
    Spin {
        #[serde(rename = "Units", deserialize_with = "validate_positive_u64")]
        units: u64,
    },
    /// One trivial task per worker; estimates the cost of dispatching a thread.
    ThreadFanOut,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum ReportFormatSetting {
    #[default]
    Csv,
    Tsv,
    JsonLines,
}

impl From<ReportFormatSetting> for ReportFormat {
    fn from(setting: ReportFormatSetting) -> Self {
        match setting {
            ReportFormatSetting::Csv => ReportFormat::CSV,
            ReportFormatSetting::Tsv => ReportFormat::TSV,
            ReportFormatSetting::JsonLines => ReportFormat::JsonLines,
        }
    }
}

fn enabled() -> bool {
    true
}

fn validate_positive_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = i64::deserialize(deserializer)?;
    u32::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| serde::de::Error::custom("Value must be positive"))
}

fn validate_positive_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = i64::deserialize(deserializer)?;
    u64::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| serde::de::Error::custom("Value must be positive"))
}

impl BenchmarkSettings {
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        let invalid = |reason: String| BenchError::Settings {
            path: path.to_path_buf(),
            reason,
        };
        let content = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        Self::from_json(&content).map_err(|e| invalid(e.to_string()))
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            include_per_label_detail: self.include_per_label_detail,
            include_system_info: self.include_system_info,
            expanded_format: self.expanded_format,
            format: self.format.into(),
        }
    }
}
