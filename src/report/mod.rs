//! Timing report artifacts
//!
//! Reports are append-only text files. A delimited artifact gets its header once, when
//! it is created; every later record must agree with it. A JSON-lines artifact holds
//! one object per record. Each record is written with a single append so an interrupted
//! run can not leave a row that looks complete.

pub mod path;
pub mod system_info;

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ReportError;
use crate::stats::ProbeMeasurement;
pub use path::{perf_date_stamp, replace_occurrence, resolve_report_path, DATESTAMP_TOKEN};
pub use system_info::{system_information, SystemInformation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// One row per label, fields separated by `delimiter`.
    Delimited { delimiter: u8 },
    /// One JSON object per record.
    JsonLines,
}

impl ReportFormat {
    pub const CSV: Self = ReportFormat::Delimited { delimiter: b',' };
    pub const TSV: Self = ReportFormat::Delimited { delimiter: b'\t' };
}

impl Default for ReportFormat {
    fn default() -> Self {
        Self::CSV
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOptions {
    /// Emit every per-iteration duration, not only the summary.
    pub include_per_label_detail: bool,
    pub include_system_info: bool,
    /// Add standard deviation, standard error, min and max.
    pub expanded_format: bool,
    pub format: ReportFormat,
}

/// Write `measurements` with default run parameters. See [`ReportWriter::write_report`].
pub fn write_report(
    template: &str,
    measurements: &[ProbeMeasurement],
    options: &ReportOptions,
) -> Result<PathBuf, ReportError> {
    ReportWriter::new(options.clone()).write_report(template, measurements)
}

/// Appends timing records to a date-stamped artifact.
#[derive(Debug, Clone, Default)]
pub struct ReportWriter {
    options: ReportOptions,
    parameters: Vec<(String, String)>,
}

impl ReportWriter {
    pub fn new(options: ReportOptions) -> Self {
        Self {
            options,
            parameters: Vec::new(),
        }
    }

    /// Record a run parameter (iterations, thread count, ...) alongside each row.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.parameters.push((key.into(), value.to_string()));
        self
    }

    /// Resolve `template` for today and append one record. Returns the resolved path.
    pub fn write_report(
        &self,
        template: &str,
        measurements: &[ProbeMeasurement],
    ) -> Result<PathBuf, ReportError> {
        self.write_report_at(template, measurements, Local::now())
    }

    /// Same as [`ReportWriter::write_report`] with an explicit report time.
    pub fn write_report_at(
        &self,
        template: &str,
        measurements: &[ProbeMeasurement],
        now: DateTime<Local>,
    ) -> Result<PathBuf, ReportError> {
        let path = resolve_report_path(template, now.date_naive());
        if measurements.is_empty() {
            info!(path = %path.display(), "no probes have been created, nothing to report");
            return Ok(path);
        }

        let run_id = run_identifier(&path, now);
        let system = self
            .options
            .include_system_info
            .then(system_information);

        match self.options.format {
            ReportFormat::Delimited { delimiter } => {
                let header = self.header(delimiter);
                let body = self.delimited_rows(delimiter, &run_id, system.as_ref(), measurements)?;
                append_record(&path, Layout::Delimited { header: &header }, &body)?;
            }
            ReportFormat::JsonLines => {
                let body = self.json_record(&run_id, now, system, measurements)?;
                append_record(&path, Layout::JsonLines, &body)?;
            }
        }

        info!(path = %path.display(), run = %run_id, labels = measurements.len(), "appended timing report");
        Ok(path)
    }

    fn columns(&self) -> Vec<&'static str> {
        let mut columns = vec!["run_id", "parameters", "label", "count", "mean_s", "total_s"];
        if self.options.expanded_format {
            columns.extend(["std_dev_s", "std_error_s", "min_s", "max_s"]);
        }
        if self.options.include_system_info {
            columns.extend(["os", "cpu", "logical_cores", "total_memory_mb", "elevated_privileges"]);
        }
        if self.options.include_per_label_detail {
            columns.push("samples_s");
        }
        columns
    }

    fn header(&self, delimiter: u8) -> String {
        self.columns().join(&char::from(delimiter).to_string())
    }

    fn parameter_string(&self) -> String {
        self.parameters
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    fn delimited_rows(
        &self,
        delimiter: u8,
        run_id: &str,
        system: Option<&SystemInformation>,
        measurements: &[ProbeMeasurement],
    ) -> Result<Vec<u8>, ReportError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        let parameters = self.parameter_string();

        for measurement in measurements {
            let stats = &measurement.statistics;
            let mut row = vec![
                run_id.to_owned(),
                parameters.clone(),
                measurement.label.clone(),
                stats.count().to_string(),
                seconds(stats.mean()),
                seconds(Some(stats.total())),
            ];
            if self.options.expanded_format {
                row.extend([
                    seconds(stats.standard_deviation()),
                    seconds(stats.standard_error()),
                    seconds(stats.min()),
                    seconds(stats.max()),
                ]);
            }
            if let Some(system) = system {
                row.extend([
                    system.os.clone(),
                    system.cpu.clone(),
                    system.logical_cores.to_string(),
                    system.total_memory_mb.to_string(),
                    system.elevated_privileges.to_string(),
                ]);
            }
            if self.options.include_per_label_detail {
                row.push(
                    measurement
                        .samples
                        .iter()
                        .map(|sample| format!("{sample:.9}"))
                        .collect::<Vec<_>>()
                        .join(";"),
                );
            }
            writer.write_record(&row)?;
        }

        writer
            .into_inner()
            .map_err(|err| ReportError::Csv(csv::Error::from(err.into_error())))
    }

    fn json_record(
        &self,
        run_id: &str,
        now: DateTime<Local>,
        system: Option<SystemInformation>,
        measurements: &[ProbeMeasurement],
    ) -> Result<Vec<u8>, ReportError> {
        let record = JsonRecord {
            run_id,
            timestamp: now.to_rfc3339(),
            parameters: self
                .parameters
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect(),
            system,
            probes: measurements
                .iter()
                .map(|measurement| self.json_probe(measurement))
                .collect(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        Ok(line)
    }

    fn json_probe<'a>(&self, measurement: &'a ProbeMeasurement) -> JsonProbe<'a> {
        let stats = &measurement.statistics;
        JsonProbe {
            label: &measurement.label,
            count: stats.count(),
            mean: stats.mean(),
            total: stats.total(),
            spread: self.options.expanded_format.then(|| Spread {
                std_dev: stats.standard_deviation(),
                std_error: stats.standard_error(),
                min: stats.min(),
                max: stats.max(),
            }),
            samples: self
                .options
                .include_per_label_detail
                .then_some(measurement.samples.as_slice()),
        }
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    run_id: &'a str,
    timestamp: String,
    parameters: BTreeMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<SystemInformation>,
    probes: Vec<JsonProbe<'a>>,
}

#[derive(Serialize)]
struct JsonProbe<'a> {
    label: &'a str,
    count: u64,
    mean: Option<f64>,
    total: f64,
    #[serde(flatten)]
    spread: Option<Spread>,
    #[serde(skip_serializing_if = "Option::is_none")]
    samples: Option<&'a [f64]>,
}

#[derive(Serialize)]
struct Spread {
    std_dev: Option<f64>,
    std_error: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

fn seconds(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.9}")).unwrap_or_default()
}

/// `<file stem>@<report time>`, unique per run of the same artifact.
fn run_identifier(path: &Path, now: DateTime<Local>) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}@{}", stem, now.format("%Y-%m-%dT%H:%M:%S%.3f"))
}

/// What an existing artifact must already look like before a record joins it.
#[derive(Debug, Clone, Copy)]
enum Layout<'a> {
    Delimited { header: &'a str },
    JsonLines,
}

impl Layout<'_> {
    fn accepts(self, first_line: &str) -> bool {
        match self {
            Layout::Delimited { header } => first_line == header,
            Layout::JsonLines => first_line.starts_with('{'),
        }
    }

    fn expected(self) -> String {
        match self {
            Layout::Delimited { header } => header.to_owned(),
            Layout::JsonLines => "one JSON object per line".to_owned(),
        }
    }
}

fn append_record(path: &Path, layout: Layout<'_>, body: &[u8]) -> Result<(), ReportError> {
    let io_err = |source: io::Error| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();

    let mut record = Vec::with_capacity(body.len() + 256);
    if len == 0 {
        if let Layout::Delimited { header } = layout {
            record.extend_from_slice(header.as_bytes());
            record.push(b'\n');
        }
    } else {
        let found = first_line(&mut file).map_err(io_err)?;
        if !layout.accepts(&found) {
            return Err(ReportError::HeaderMismatch {
                path: path.to_path_buf(),
                expected: layout.expected(),
                found,
            });
        }
        if !ends_with_newline(&mut file).map_err(io_err)? {
            record.push(b'\n');
        }
    }
    record.extend_from_slice(body);

    file.write_all(&record).map_err(io_err)?;
    file.sync_data().map_err(io_err)
}

fn first_line(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut line = String::new();
    BufReader::new(&mut *file).read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
