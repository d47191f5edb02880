mod cli;

use std::io;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use almanac::config::Config;

/// Log filter variable, e.g. `ALMANAC_LOG=almanac=debug`.
const LOG_ENV: &str = "ALMANAC_LOG";

fn main() {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("almanac=info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(cli::run(cli, &config)) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
