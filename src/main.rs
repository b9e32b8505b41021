// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging (stderr, level from RUST_LOG or --log-level)
// 3. Build and validate the configuration, load the wordlists
// 4. Hand everything to the controller and wait for the scan to end
// 5. Exit with proper code (0 = completed, 1 = aborted, 2 = error)
//
// Rust concepts used:
// - async/await: every worker is a tokio task sending requests concurrently
// - Result<T, E> and ?: any error bubbles up to main and becomes exit code 2
// - Arc: the config and the dictionary are shared by every task
// =============================================================================

// Module declarations - tells Rust about our other source files
mod cli;           // src/cli.rs - command-line parsing
mod config;        // src/config.rs - the validated scan configuration
mod controller;    // src/controller/ - targets, jobs, recursion
mod crawl;         // src/crawl/ - link extraction for --crawl
mod dictionary;    // src/dictionary/ - wordlist expansion and the shared cursor
mod error;         // src/error.rs - typed errors
mod fuzzer;        // src/fuzzer/ - the worker pool
mod output;        // src/output.rs - result lines and the JSON report
mod paths;         // src/paths.rs - URL path helpers
mod requester;     // src/requester/ - HTTP
mod scanner;       // src/scanner/ - wildcard detection

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use controller::{Controller, ScanStatus};
use dictionary::Dictionary;
use error::ConfigError;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Parse command-line arguments into our Cli struct
    // This will automatically handle --help, --version, etc.
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            // If an unexpected error occurred, print it and exit with code 2
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Logs go to stderr so stdout only carries results
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// Returns:
//   Ok(0) = scan completed
//   Ok(1) = scan aborted (quit, --exit-on-error, --max-time)
//   Err   = configuration or unexpected error
async fn run(cli: Cli) -> Result<i32> {
    let config = cli.into_config()?;
    config.validate()?;

    let lines = dictionary::read_wordlists(&config.wordlists)?;
    let dictionary = Dictionary::new(lines, config.dictionary.clone());
    if dictionary.is_empty() {
        return Err(ConfigError::EmptyWordlist.into());
    }
    info!("Loaded {} dictionary entries", dictionary.len());

    let mut controller = Controller::new(Arc::new(config), Arc::new(dictionary))?;
    controller.listen_for_interrupts();

    match controller.run().await? {
        ScanStatus::Completed => Ok(0),
        ScanStatus::Aborted => Ok(1),
    }
}
