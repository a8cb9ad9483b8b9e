use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "solcov", version, about = "Bytecode-to-source coverage attribution")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Trace a set of transactions and produce a coverage report.
    Cover(CoverArgs),
}

#[derive(Debug, Args)]
pub struct CoverArgs {
    /// Where to write the JSON coverage report.
    #[arg(long, value_name = "PATH")]
    pub coverage_file: Option<PathBuf>,

    /// Skip invoking the build tool; assume `out/` is already up to date.
    #[arg(long)]
    pub no_compile: bool,

    /// JSON-RPC endpoint to trace transactions against.
    #[arg(long, env = "SOLCOV_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Transaction hashes to trace and attribute.
    ///
    /// Produced by whatever ran the test suite against the traced node —
    /// running that test suite is outside what this binary does.
    pub tx_hashes: Vec<String>,
}
