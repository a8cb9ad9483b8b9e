//! The `cover` task: loads artifacts and config, traces the given
//! transactions, and writes the resulting coverage report to disk.

use crate::artifacts::DirectoryArtifacts;
use crate::cli::CoverArgs;
use solcov_common::Config;
use solcov_coverage::{filtered_report, Coverage, Report};
use solcov_sources::Sources;
use solcov_trace::provider::{HttpProvider, JsonRpcProvider};
use solcov_trace::Trace;
use std::path::Path;

pub async fn run(args: CoverArgs) -> eyre::Result<()> {
    let root = dunce::canonicalize(std::env::current_dir()?)?;
    let mut config = Config::load(&root)?;
    config.merge_cli(args.coverage_file, args.rpc_url, args.no_compile);
    let provider = HttpProvider::new(config.rpc_url.clone());
    run_cover(&root, &config, &args.tx_hashes, &provider).await
}

/// The `cover` task's actual work, generic over the JSON-RPC transport so
/// it can be exercised against a fixture provider (e.g. `RecordedProvider`)
/// in tests instead of only against a real node.
pub async fn run_cover<P: JsonRpcProvider + ?Sized>(
    root: &Path,
    config: &Config,
    tx_hashes: &[String],
    provider: &P,
) -> eyre::Result<()> {
    if !config.no_compile {
        tracing::warn!(
            "solcov does not invoke a build tool itself; pass --no-compile once artifacts in \
             `{}` are up to date to silence this notice",
            config.artifacts_dir.display()
        );
    }

    let artifacts = DirectoryArtifacts::discover(&root.join(&config.artifacts_dir))?;
    let ignore = config.ignore.clone();
    let filter = move |fqn: &str| !ignore.iter().any(|prefix| fqn.starts_with(prefix.as_str()));
    let mut sources = Sources::crawl(&artifacts, Some(&filter))?;

    let coverage = Coverage::cover(&sources);

    let mut report: Option<Report> = None;
    for tx_hash in tx_hashes {
        match Trace::crawl(provider, tx_hash).await {
            Ok(trace) => {
                sources.load_addresses(trace.address_to_code.iter().map(|(a, c)| (*a, c.clone())));
                report = Some(coverage.report(&mut sources, &trace.tagged_logs, report.take())?);
            }
            Err(error) => {
                tracing::warn!(%tx_hash, %error, "failed to trace transaction, skipping");
            }
        }
    }

    // No transaction produced a trace to accumulate into (or none were
    // given): still emit the zero-initialized report for every known path
    // rather than an empty object.
    let report = match report {
        Some(report) => report,
        None => coverage.report(&mut sources, &[], None)?,
    };
    let filtered = filtered_report(&report, &coverage);
    let json = serde_json::to_string_pretty(&filtered)?;
    std::fs::write(&config.coverage_file, json)?;
    tracing::info!(path = %config.coverage_file.display(), "wrote coverage report");
    Ok(())
}
