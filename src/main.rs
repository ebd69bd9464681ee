mod auth;
mod cli;
mod config;
mod error;
mod output;
mod pipeline;
mod providers;
mod store;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap and env_logger read the environment.
    let dotenv = match dotenvy::dotenv() {
        Ok(path) => Some(path),
        Err(e) if e.not_found() => None,
        Err(e) => return Err(e.into()),
    };
    env_logger::init();
    if let Some(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting testmend");
    cli.execute().await?;

    Ok(())
}
