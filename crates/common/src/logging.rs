//! `tracing` initialization shared by the `cover` CLI and its integration
//! tests.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs a `tracing-subscriber` registry that reads its filter from
/// `SOLCOV_LOG`, defaulting to `info`.
///
/// Output goes to stderr so stdout (and the coverage report file) stay
/// free of log noise, mirroring how `foundry-cli` keeps its human-readable
/// logs off of piped command output.
pub fn init() {
    let filter = EnvFilter::try_from_env("SOLCOV_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
