// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Stevedore Control Plane
//!
//! The `stevedore` binary runs the platform-as-a-service control plane.
//!
//! ## Commands
//!
//! - `stevedore serve` - Run the HTTP API until SIGINT/SIGTERM
//! - `stevedore config show|validate|generate` - Configuration management
//!
//! Configuration is discovered from `--config`, `STEVEDORE_CONFIG_PATH`,
//! `./stevedore.yaml`, `~/.stevedore/config.yaml` and
//! `/etc/stevedore/config.yaml`, in that order.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use stevedore_cli::commands::{self, ConfigCommand};
use stevedore_cli::daemon::{self, ServeOptions};
use stevedore_core::domain::platform_config::{ControlPlaneManifest, LogFormat};

/// Stevedore - application lifecycle and deployment control plane
#[derive(Parser)]
#[command(name = "stevedore")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "STEVEDORE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "STEVEDORE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control plane HTTP API
    #[command(name = "serve")]
    Serve {
        /// Listen address (overrides spec.api.bind_address)
        #[arg(long, env = "STEVEDORE_HOST")]
        host: Option<String>,

        /// Listen port (overrides spec.api.port)
        #[arg(long, env = "STEVEDORE_PORT")]
        port: Option<u16>,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            let config = ControlPlaneManifest::load_or_default(cli.config)
                .context("Failed to load configuration")?;
            let observability = &config.spec.observability;
            let level = cli
                .log_level
                .unwrap_or_else(|| observability.log_level.clone());
            init_logging(&level, observability.log_format)?;

            info!("Starting Stevedore control plane");
            daemon::start_server(config, ServeOptions { host, port }).await
        }
        Some(Commands::Config { command }) => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), LogFormat::Compact)?;
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
