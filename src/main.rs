//! CLI entry point for the bookshelf tool.

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod app;
mod app_config;
mod cli;

use app_config::{RuntimeSettings, load_default_file_config};
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let file_config = load_default_file_config()?;
    let settings = RuntimeSettings::resolve(&args, file_config.as_ref())?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config file > info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, data_dir = %settings.storage.base_dir().display(), "CLI arguments parsed");

    app::run(args.command, &settings).await
}
