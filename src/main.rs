use std::path::PathBuf;

use probe_bench::core::DEFAULT_SETTINGS_FILE;
use probe_bench::run_benchmark;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let settings_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));

    if let Err(e) = run_benchmark(&settings_path).await {
        eprintln!("Fatal error: {}", e);
        std::process::exit(1);
    }
}
