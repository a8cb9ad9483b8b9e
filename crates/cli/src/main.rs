use clap::Parser;
use solcov_cli::cli::{Cli, Commands};
use solcov_cli::cover;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    solcov_common::logging::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Cover(args) => cover::run(args).await,
    }
}
