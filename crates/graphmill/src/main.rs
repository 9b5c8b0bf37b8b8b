mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

const DEFAULT_LOG_FILTER: &str = "graphmill=info,graphmill_core=info";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    dispatch(cli.command).await
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Ingest(args) => cli::ingest::run(args).await,
        Commands::Policy { roles, table } => cli::policy::run(&roles, table.as_deref()),
        Commands::Id { label, properties } => cli::id::run(&label, &properties),
    }
}
