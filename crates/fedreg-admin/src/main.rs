//! fedreg admin console: the command-line entry point for the federation
//! entity registry.
//!
//! Loads configuration, initializes structured logging on stderr, opens the
//! database pool, applies pending migrations, then runs one command.

mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use fedreg_entities::Registry;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::LoggingConfig;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, found) = config::load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;

    init_tracing(&config.logging);
    if found {
        tracing::debug!(path = %cli.config, "loaded configuration");
    } else {
        tracing::info!(path = %cli.config, "config file not found, using defaults");
    }

    let pool = fedreg_db::create_pool(&config.database.path, config.database.runtime_settings())
        .context("failed to create database pool; check database.path in config")?;

    {
        let conn = pool
            .get()
            .context("failed to get database connection for migrations")?;
        let applied =
            fedreg_db::run_migrations(&conn).context("failed to run database migrations")?;
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    let registry = Registry::new(pool, Arc::new(config.registry));
    let mut stdout = std::io::stdout().lock();
    cli.command.run(&registry, &mut stdout)
}
