// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Environment Manager
//!
//! Merges variables into an app's environment and pushes the result to its
//! ready units as a shell file sourced at session start. Private variables
//! (the ones service bindings inject) are protected from public writes and
//! are masked on every read.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::access::AccessGuard;
use crate::application::dispatcher::CommandDispatcher;
use crate::application::registry::AppRegistry;
use crate::domain::app::{is_valid_env_name, App, EnvVar};
use crate::domain::error::{PlatformError, MISSING_ENV_VARS};
use crate::domain::platform_config::DeployConfig;
use crate::domain::team::User;

/// Environment operations exposed to API callers.
///
/// Writes made through this surface are always public-only: they can never
/// overwrite or remove a private variable.
#[async_trait]
pub trait EnvironmentService: Send + Sync {
    /// `NAME=value` lines, all variables when `names` is empty
    async fn get_env(&self, user: &User, app: &str, names: &[String]) -> Result<String, PlatformError>;

    async fn set_env(&self, user: &User, app: &str, vars: Vec<EnvVar>) -> Result<(), PlatformError>;

    async fn unset_env(&self, user: &User, app: &str, names: &[String]) -> Result<(), PlatformError>;
}

pub struct EnvironmentManager {
    registry: AppRegistry,
    guard: AccessGuard,
    dispatcher: Arc<dyn CommandDispatcher>,
    paths: DeployConfig,
}

impl EnvironmentManager {
    pub fn new(
        registry: AppRegistry,
        guard: AccessGuard,
        dispatcher: Arc<dyn CommandDispatcher>,
        paths: DeployConfig,
    ) -> Self {
        Self {
            registry,
            guard,
            dispatcher,
            paths,
        }
    }

    /// Merge `vars` into the stored environment, then push it to the units
    pub async fn merge(
        &self,
        app: &str,
        vars: Vec<EnvVar>,
        public_only: bool,
    ) -> Result<App, PlatformError> {
        let (app, written) = self
            .registry
            .modify(app, move |app| Ok(app.set_env(vars, public_only)))
            .await?;
        info!(app = %app.name, vars = ?written, "Environment variables set");
        self.push(&app).await?;
        Ok(app)
    }

    /// Remove `names` from the stored environment, then push it to the units
    pub async fn remove(
        &self,
        app: &str,
        names: Vec<String>,
        public_only: bool,
    ) -> Result<App, PlatformError> {
        let (app, removed) = self
            .registry
            .modify(app, move |app| Ok(app.unset_env(&names, public_only)))
            .await?;
        info!(app = %app.name, vars = ?removed, "Environment variables unset");
        self.push(&app).await?;
        Ok(app)
    }

    /// Rewrite the environment file on every ready unit
    pub async fn push(&self, app: &App) -> Result<(), PlatformError> {
        if !app.has_ready_units() {
            debug!(app = %app.name, "No ready units, environment push skipped");
            return Ok(());
        }
        let command = env_file_command(app, &self.paths.env_file);
        self.dispatcher.run_on_app(app, &command).await?;
        debug!(app = %app.name, "Environment pushed to units");
        Ok(())
    }
}

#[async_trait]
impl EnvironmentService for EnvironmentManager {
    async fn get_env(&self, user: &User, app: &str, names: &[String]) -> Result<String, PlatformError> {
        let app = self.guard.authorized_app(app, user).await?;
        Ok(app.env_lines(names))
    }

    async fn set_env(&self, user: &User, app: &str, vars: Vec<EnvVar>) -> Result<(), PlatformError> {
        if vars.is_empty() {
            return Err(PlatformError::BadRequest(MISSING_ENV_VARS.to_string()));
        }
        self.guard.authorized_app(app, user).await?;
        self.merge(app, vars, true).await?;
        Ok(())
    }

    async fn unset_env(&self, user: &User, app: &str, names: &[String]) -> Result<(), PlatformError> {
        if names.is_empty() {
            return Err(PlatformError::BadRequest(MISSING_ENV_VARS.to_string()));
        }
        self.guard.authorized_app(app, user).await?;
        self.remove(app, names.to_vec(), true).await?;
        Ok(())
    }
}

/// Shell command that rewrites the environment file with every variable.
///
/// Each `export` stays on one line so no value can end the heredoc.
pub fn env_file_command(app: &App, env_file: &str) -> String {
    let mut command = format!("cat > {} <<'END'\n# generated by stevedore\n", env_file);
    for var in app.env.values() {
        if !is_valid_env_name(&var.name) {
            warn!(app = %app.name, name = ?var.name, "Skipping invalid environment variable name");
            continue;
        }
        let _ = writeln!(command, "export {}=\"{}\"", var.name, escape_double_quoted(&var.value));
    }
    command.push_str("END\n");
    command
}

fn escape_double_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' | '`' => {
                escaped.push('\\');
                escaped.push(c);
            }
            // $'\n' keeps the export on one line
            '\n' => escaped.push_str("\"$'\\n'\""),
            '\r' => escaped.push_str("\"$'\\r'\""),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Parse a `NAME=value NAME2=value two` body into public variables.
///
/// A token that does not start a new assignment continues the previous
/// value, so values may contain spaces and `=`.
pub fn parse_assignments(body: &str) -> Result<Vec<EnvVar>, PlatformError> {
    let mut vars: Vec<EnvVar> = Vec::new();
    for token in body.split_whitespace() {
        let assignment = token
            .split_once('=')
            .filter(|(name, _)| is_valid_env_name(name));
        match assignment {
            Some((name, value)) => vars.push(EnvVar::public(name, value)),
            None => {
                if let Some(last) = vars.last_mut() {
                    last.value.push(' ');
                    last.value.push_str(token);
                }
            }
        }
    }
    if vars.is_empty() {
        return Err(PlatformError::BadRequest(MISSING_ENV_VARS.to_string()));
    }
    Ok(vars)
}

/// Whitespace-separated variable names
pub fn parse_names(body: &str) -> Vec<String> {
    body.split_whitespace().map(str::to_string).collect()
}
