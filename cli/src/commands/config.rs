// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use stevedore_core::domain::platform_config::ControlPlaneManifest;
use stevedore_core::domain::repository::StorageBackend;

const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./stevedore.yaml)
        #[arg(short, long, default_value = "./stevedore.yaml")]
        output: PathBuf,

        /// Include bootstrap examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(&output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ControlPlaneManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. STEVEDORE_CONFIG_PATH: {}",
            std::env::var("STEVEDORE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./stevedore.yaml");
        println!("  4. ~/.stevedore/config.yaml");
        println!("  5. /etc/stevedore/config.yaml");
        println!();
    }

    let spec = &config.spec;

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Control Plane:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Listen: {}:{}", spec.api.bind_address, spec.api.port);
    match config.storage_backend() {
        StorageBackend::InMemory => println!("  Storage: {}", "in-memory".yellow()),
        StorageBackend::PostgreSQL(_) => println!("  Storage: PostgreSQL"),
    }
    println!();

    println!("{}", "Collaborators:".bold());
    println!("  Repository host: {} (clone host {})", spec.git.server, spec.git.host);
    println!(
        "  Provisioner: {} (timeout {}s)",
        spec.provisioner.binary, spec.provisioner.command_timeout_secs
    );
    println!(
        "  Service release: retry every {}ms, give up after {}s",
        spec.services.release_retry_interval_ms, spec.services.release_timeout_secs
    );
    println!();

    println!("{}", "Unit Layout:".bold());
    println!("  App directory: {}", spec.deploy.app_dir);
    println!("  Environment file: {}", spec.deploy.env_file);
    println!("  Hooks: {}", spec.deploy.hooks_dir);
    println!("  Hook manifest: {}", spec.deploy.manifest_path());
    println!();

    if !spec.bootstrap.is_empty() {
        println!("{}", "Bootstrap:".bold());
        for team in &spec.bootstrap.teams {
            println!("  team {} ({} users)", team.name.bold(), team.users.len());
        }
        for service in &spec.bootstrap.services {
            println!("  service {} → {}", service.name.bold(), service.endpoint);
            for instance in &service.instances {
                println!("    - {}", instance.name);
            }
        }
        println!();
    }

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ControlPlaneManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid() {
        for template in [MINIMAL_TEMPLATE, EXAMPLES_TEMPLATE] {
            let config = ControlPlaneManifest::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }

    #[tokio::test]
    async fn test_generate_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stevedore.yaml");

        generate(&path, true).await.unwrap();

        let config = ControlPlaneManifest::from_yaml_file(&path).unwrap();
        assert_eq!(config.spec.bootstrap.teams[0].name, "admin");
    }
}
