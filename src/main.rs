mod agent;
mod cli;
mod collector;
mod protocol;
mod screen;
mod storage;

use anyhow::Result;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Agent { srv, period } => agent::run(srv, period).await,
        Commands::Collect { port } => collector::run(port).await,
    }
}
