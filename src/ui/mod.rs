//! Console output for the benchmark driver.

pub mod summary;

pub use summary::{print_section, print_summary, print_title, statistics_table};
