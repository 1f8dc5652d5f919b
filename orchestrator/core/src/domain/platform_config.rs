// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Control Plane Configuration Types
//
// Defines the configuration schema for a Stevedore control plane node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - API listener, persistence and collaborator endpoints
// - Remote paths used by the deploy pipeline
// - Logging and metrics settings
// - Optional bootstrap teams and services

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "stevedore.io/v1";
pub const KIND: &str = "ControlPlaneConfig";

/// Top-level Kubernetes-style control plane manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneManifest {
    /// API version (must be "stevedore.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ControlPlaneConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: ControlPlaneSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlPlaneSpec {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub git: GitConfig,

    #[serde(default)]
    pub provisioner: ProvisionerConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub deploy: DeployConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default, skip_serializing_if = "BootstrapConfig::is_empty")]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string; in-memory stores when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Base URL of the repository host API (e.g., "http://localhost:8000")
    #[serde(default = "default_git_server")]
    pub server: String,

    /// Hostname used in clone and push URLs
    #[serde(default = "default_git_host")]
    pub host: String,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Path or name of the provisioner client binary
    #[serde(default = "default_provisioner_binary")]
    pub binary: String,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Charm repository passed to deploy
    #[serde(default = "default_charms_path")]
    pub charms_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Delay between attempts to release a resource after unbind
    #[serde(default = "default_release_retry_interval_ms")]
    pub release_retry_interval_ms: u64,

    /// Give up releasing a resource after this long
    #[serde(default = "default_release_timeout_secs")]
    pub release_timeout_secs: u64,
}

/// Remote layout of a unit, used by the dispatcher and the deploy pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_app_dir")]
    pub app_dir: String,

    #[serde(default = "default_env_file")]
    pub env_file: String,

    #[serde(default = "default_hooks_dir")]
    pub hooks_dir: String,

    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,

    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Seed data for deployments without an identity subsystem
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub teams: Vec<BootstrapTeam>,

    #[serde(default)]
    pub services: Vec<BootstrapService>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapTeam {
    pub name: String,
    #[serde(default)]
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapService {
    pub name: String,
    pub endpoint: String,
    /// Instances created alongside the service, granted to these teams
    #[serde(default)]
    pub instances: Vec<BootstrapInstance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapInstance {
    pub name: String,
    #[serde(default)]
    pub teams: Vec<String>,
}

impl BootstrapConfig {
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty() && self.services.is_empty()
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_max_connections() -> u32 {
    5
}

fn default_git_server() -> String {
    "http://localhost:8000".to_string()
}

fn default_git_host() -> String {
    "localhost".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_provisioner_binary() -> String {
    "juju".to_string()
}

fn default_command_timeout_secs() -> u64 {
    300
}

fn default_charms_path() -> String {
    "/home/charms".to_string()
}

fn default_release_retry_interval_ms() -> u64 {
    1000
}

fn default_release_timeout_secs() -> u64 {
    60
}

fn default_app_dir() -> String {
    "/home/application/current".to_string()
}

fn default_env_file() -> String {
    "/home/application/apprc".to_string()
}

fn default_hooks_dir() -> String {
    "/var/lib/stevedore/hooks".to_string()
}

fn default_manifest_file() -> String {
    "app.yaml".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            server: default_git_server(),
            host: default_git_host(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            binary: default_provisioner_binary(),
            command_timeout_secs: default_command_timeout_secs(),
            charms_path: default_charms_path(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            release_retry_interval_ms: default_release_retry_interval_ms(),
            release_timeout_secs: default_release_timeout_secs(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            app_dir: default_app_dir(),
            env_file: default_env_file(),
            hooks_dir: default_hooks_dir(),
            manifest_file: default_manifest_file(),
            branch: default_branch(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for ControlPlaneManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "stevedore".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                labels: None,
            },
            spec: ControlPlaneSpec::default(),
        }
    }
}

impl ServicesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn release_retry_interval(&self) -> Duration {
        Duration::from_millis(self.release_retry_interval_ms)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_secs(self.release_timeout_secs)
    }
}

impl DeployConfig {
    pub fn manifest_path(&self) -> String {
        format!("{}/{}", self.app_dir.trim_end_matches('/'), self.manifest_file)
    }

    pub fn hook_path(&self, hook: &str) -> String {
        format!("{}/{}", self.hooks_dir.trim_end_matches('/'), hook)
    }
}

impl ControlPlaneManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. STEVEDORE_CONFIG_PATH environment variable
    /// 2. ./stevedore.yaml (working directory)
    /// 3. ~/.stevedore/config.yaml (user home)
    /// 4. /etc/stevedore/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("STEVEDORE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./stevedore.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".stevedore").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/stevedore/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("STEVEDORE_DATABASE_URL") {
            tracing::info!("Environment override: STEVEDORE_DATABASE_URL");
            self.spec.database.url = Some(url);
        }
        if let Some(server) = lookup("STEVEDORE_GIT_SERVER") {
            tracing::info!("Environment override: STEVEDORE_GIT_SERVER={}", server);
            self.spec.git.server = server;
        }
        if let Some(host) = lookup("STEVEDORE_GIT_HOST") {
            tracing::info!("Environment override: STEVEDORE_GIT_HOST={}", host);
            self.spec.git.host = host;
        }
        if let Some(level) = lookup("STEVEDORE_LOG_LEVEL") {
            self.spec.observability.log_level = level;
        }
    }

    /// Persistence backend selected by `spec.database.url`
    pub fn storage_backend(&self) -> StorageBackend {
        match &self.spec.database.url {
            Some(url) if !url.is_empty() => StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: url.clone(),
            }),
            _ => StorageBackend::InMemory,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;
        if spec.api.port == 0 {
            anyhow::bail!("spec.api.port must be greater than zero");
        }

        if spec.git.server.is_empty() || spec.git.host.is_empty() {
            anyhow::bail!("spec.git.server and spec.git.host cannot be empty");
        }

        if spec.git.timeout_secs == 0
            || spec.provisioner.command_timeout_secs == 0
            || spec.services.request_timeout_secs == 0
            || spec.services.release_timeout_secs == 0
        {
            anyhow::bail!("Timeouts must be greater than zero");
        }

        if spec.services.release_retry_interval() >= spec.services.release_timeout() {
            anyhow::bail!(
                "spec.services.release_retry_interval_ms must be smaller than release_timeout_secs"
            );
        }

        for (field, path) in [
            ("app_dir", &spec.deploy.app_dir),
            ("env_file", &spec.deploy.env_file),
            ("hooks_dir", &spec.deploy.hooks_dir),
        ] {
            if !path.starts_with('/') {
                anyhow::bail!("spec.deploy.{} must be an absolute path: '{}'", field, path);
            }
        }

        for team in &spec.bootstrap.teams {
            if team.name.is_empty() {
                anyhow::bail!("Bootstrap team name cannot be empty");
            }
        }

        for service in &spec.bootstrap.services {
            if service.endpoint.is_empty() {
                anyhow::bail!("Bootstrap service endpoint cannot be empty for: {}", service.name);
            }
        }

        Ok(())
    }
}
