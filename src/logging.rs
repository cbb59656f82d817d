//! Tracing setup for the CLI.
//!
//! `RUST_LOG` wins when set; otherwise `--verbose` switches the crate from info to debug.

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let default = if verbose {
        "renovation_optimizer=debug"
    } else {
        "renovation_optimizer=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Stdout carries only the batch report.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
