//! Console rendering of collected timings

use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};

use crate::stats::ProbeMeasurement;

const SEPARATOR_WIDTH: usize = 60;

pub fn print_title(title: &str) {
    let separator = "=".repeat(SEPARATOR_WIDTH);
    println!("\n{}", separator);
    println!("{:^60}", title.bold().cyan());
    println!("{}\n", separator);
}

pub fn print_section(name: &str) {
    println!("{}", name.bold().yellow());
    println!("{}", "━".repeat(name.chars().count().max(20)));
}

fn millis(value: Option<f64>) -> String {
    value
        .map(|seconds| format!("{:.4}", seconds * 1e3))
        .unwrap_or_else(|| "-".to_owned())
}

/// Table with one row per label, durations in milliseconds.
pub fn statistics_table(measurements: &[ProbeMeasurement]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Probe", "Iterations", "Total (ms)", "Min (ms)", "Mean (ms)", "Max (ms)", "Std (ms)",
            "StdErr (ms)",
        ]);

    for measurement in measurements {
        let stats = &measurement.statistics;
        let numbers = [
            stats.count().to_string(),
            millis(Some(stats.total())),
            millis(stats.min()),
            millis(stats.mean()),
            millis(stats.max()),
            millis(stats.standard_deviation()),
            millis(stats.standard_error()),
        ];
        let mut row = vec![Cell::new(&measurement.label)];
        row.extend(
            numbers
                .into_iter()
                .map(|value| Cell::new(value).set_alignment(CellAlignment::Right)),
        );
        table.add_row(row);
    }
    table
}

pub fn print_summary(measurements: &[ProbeMeasurement]) {
    if measurements.is_empty() {
        println!("{}", "No probes have been created".yellow());
        return;
    }
    println!("{}", statistics_table(measurements));
}
