mod app;
mod auth;
mod catalog;
mod cli;
mod config;
mod db;
mod http;
mod paths;
mod resolver;
mod server;
mod store;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> Result<()> {
    // A missing .env is normal; real environment variables take precedence.
    let _ = dotenvy::dotenv();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("espen=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    app::run(cli)
}
