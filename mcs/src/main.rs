//! Codespace manager
//!
//! Creates, runs and tears down containerized development environments
//! backed by Docker Compose, with directory snapshots for recovery.

use std::sync::Arc;

use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod config;
mod domain;
mod error;
mod infra;
mod service;

use cli::Cli;
use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr so command output on stdout stays clean
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    let config = Arc::new(Config::load()?);
    debug!(
        "home {}, codespaces in {}, backups in {}",
        config.home_dir.display(),
        config.codespaces_dir.display(),
        config.backups_dir.display()
    );

    if let Err(e) = cli::run(cli, config).await {
        eprintln!("error[{}]: {}", e.code(), e);
        std::process::exit(1);
    }

    Ok(())
}
