//! Docgate CLI
//!
//! Ask questions against an internal document index, scoped to a role.

use anyhow::Result;
use clap::Parser;
use docgate_core::error::exit_codes;
use docgate_core::{Config, DocGateError};

mod app;
mod commands;
mod output;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {:#}", err);
        let code = err
            .downcast_ref::<DocGateError>()
            .map(DocGateError::exit_code)
            .unwrap_or(exit_codes::GENERAL_ERROR);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Ask(args) => commands::ask::run(args, &config, cli.format).await,
        Commands::Roles(args) => commands::roles::run(args, &config, cli.format),
        Commands::Import(args) => commands::import::run(args, &config, cli.format).await,
        Commands::Audit(args) => commands::audit::run(args, &config, cli.format),
        Commands::Status => commands::status::run(&config, cli.format),
    }
}
