//! Benchmark driver
//!
//! Loads settings, applies the worker count, times the configured workload under a
//! [`ProbesCollector`] and appends the result to the timings report.

pub mod settings;
pub mod workload;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::BenchError;
use crate::probe::ProbesCollector;
use crate::report::{system_information, ReportWriter};
use crate::ui;
pub use settings::{BenchmarkSettings, WorkloadSettings, DEFAULT_SETTINGS_FILE};
pub use workload::{
    apply_worker_count, thread_overhead, ScopedWorkerPool, SpinWorkload, ThreadFanOutWorkload,
    WorkerPool, Workload,
};

fn progress_bar(len: u64, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    bar.set_style(style);
    bar.set_message(label.to_owned());
    bar
}

/// Time `iterations` executions of `workload`, each bracketed by one start/stop pair.
pub fn time_workload<W: Workload>(
    collector: &ProbesCollector,
    workload: &mut W,
    iterations: u32,
) -> Result<(), BenchError> {
    let label = workload.label();
    let bar = progress_bar(u64::from(iterations), &label);
    for _ in 0..iterations {
        collector.measure(&label, || workload.execute())??;
        bar.inc(1);
    }
    bar.finish_with_message(format!("{label} done"));
    Ok(())
}

/// Everything the measuring thread produces.
pub struct BenchmarkOutcome {
    pub collector: ProbesCollector,
    /// Estimated dispatch cost of one extra thread, in seconds (fan-out workload only).
    pub thread_overhead: Option<f64>,
}

/// Run the timed part of a benchmark on the calling thread.
pub fn run_measurements(
    settings: &BenchmarkSettings,
    pool: ScopedWorkerPool,
) -> Result<BenchmarkOutcome, BenchError> {
    let collector = ProbesCollector::new();
    let overhead = match settings.workload {
        WorkloadSettings::Spin { units } => {
            let mut workload = SpinWorkload::new(units, pool);
            time_workload(&collector, &mut workload, settings.iterations)?;
            None
        }
        WorkloadSettings::ThreadFanOut => {
            let threads = pool.threads();
            if threads < 2 {
                return Err(BenchError::Worker(
                    "unable to estimate thread overhead with only one thread".to_owned(),
                ));
            }
            let mut single = ThreadFanOutWorkload::new(ScopedWorkerPool::with_threads(1));
            let mut multi = ThreadFanOutWorkload::new(pool);
            // Warm-up run outside the probes.
            single.execute()?;
            multi.execute()?;
            time_workload(&collector, &mut single, settings.iterations)?;
            time_workload(&collector, &mut multi, settings.iterations)?;

            let single_min = collector.statistics(&single.label())?.min();
            let multi_min = collector.statistics(&multi.label())?.min();
            single_min
                .zip(multi_min)
                .and_then(|(single, multi)| thread_overhead(single, multi, threads))
        }
    };
    Ok(BenchmarkOutcome {
        collector,
        thread_overhead: overhead,
    })
}

/// Full benchmark run: settings, measurement, console summary, report.
pub async fn run_benchmark(settings_path: &Path) -> Result<PathBuf, BenchError> {
    ui::print_title("Probe Benchmark");

    let settings = BenchmarkSettings::load(settings_path)?;
    info!(path = %settings_path.display(), "loaded benchmark settings");

    let mut pool = ScopedWorkerPool::default();
    if apply_worker_count(&mut pool, settings.threads) {
        info!(threads = pool.threads(), "worker count set");
    }

    if settings.include_system_info {
        let system = system_information();
        ui::print_section("System Information");
        println!("OS:      {}", system.os);
        println!("CPU:     {} ({} logical cores)", system.cpu, system.logical_cores);
        println!("Memory:  {} MB", system.total_memory_mb);
        println!("Admin:   {}\n", system.elevated_privileges);
        if !system.elevated_privileges {
            warn!("not running with administrative privileges, priority elevation may be refused");
        }
    }

    ui::print_section("Measurements");
    let threads = pool.threads();
    let measuring_settings = settings.clone();
    // Priority changes must stay on one thread, so measure on a dedicated blocking thread.
    let outcome = tokio::task::spawn_blocking(move || run_measurements(&measuring_settings, pool))
        .await
        .map_err(|e| BenchError::Worker(e.to_string()))??;

    let measurements = outcome.collector.report_all();
    println!();
    ui::print_summary(&measurements);
    if let Some(overhead) = outcome.thread_overhead {
        println!(
            "\nEstimated overhead cost per thread: {:.3} micro-seconds\n",
            overhead * 1e6
        );
    }

    let writer = ReportWriter::new(settings.report_options())
        .with_parameter("iterations", settings.iterations)
        .with_parameter("threads", threads)
        .with_parameter("workload", workload_name(&settings.workload));
    let path = writer.write_report(&settings.timings_file, &measurements)?;
    println!("Report appended to {}", path.display());
    Ok(path)
}

fn workload_name(workload: &WorkloadSettings) -> String {
    match workload {
        WorkloadSettings::Spin { units } => format!("spin:{units}"),
        WorkloadSettings::ThreadFanOut => "fan-out".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(workload: WorkloadSettings) -> BenchmarkSettings {
        BenchmarkSettings {
            timings_file: "unused.csv".to_owned(),
            iterations: 3,
            threads: 2,
            workload,
            expanded_format: true,
            include_system_info: false,
            include_per_label_detail: false,
            format: Default::default(),
        }
    }

    #[test]
    fn spin_workload_records_every_iteration() {
        let outcome = run_measurements(
            &settings(WorkloadSettings::Spin { units: 10_000 }),
            ScopedWorkerPool::with_threads(2),
        )
        .unwrap();
        assert_eq!(outcome.collector.statistics("Spin").unwrap().count(), 3);
        assert!(outcome.thread_overhead.is_none());
    }

    #[test]
    fn fan_out_measures_both_thread_counts() {
        let outcome = run_measurements(
            &settings(WorkloadSettings::ThreadFanOut),
            ScopedWorkerPool::with_threads(3),
        )
        .unwrap();
        assert_eq!(
            outcome.collector.labels(),
            vec!["FanOutWithThreads-1", "FanOutWithThreads-3"]
        );
        assert!(outcome.thread_overhead.is_some());
    }

    #[test]
    fn fan_out_rejects_single_thread() {
        let result = run_measurements(
            &settings(WorkloadSettings::ThreadFanOut),
            ScopedWorkerPool::with_threads(1),
        );
        assert!(matches!(result, Err(BenchError::Worker(_))));
    }
}
