// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote Command Dispatcher
//!
//! Runs shell commands on an app's units through the provisioner. Every
//! command is wrapped in a preamble that loads the app environment file and
//! moves into the current release directory when they exist.
//!
//! Fan-out across units is sequential in `Units` order and stops at the
//! first failing unit; output gathered up to that point travels with the
//! error in a [`PipelineFailure`].

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::app::{App, Unit};
use crate::domain::error::{PipelineFailure, PlatformError};
use crate::domain::platform_config::DeployConfig;
use crate::domain::provisioner::Provisioner;

#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Run `command` on one unit
    async fn run(&self, unit: &Unit, command: &str) -> Result<String, PipelineFailure>;

    /// Run `command` on every ready unit of the app
    async fn run_on_app(&self, app: &App, command: &str) -> Result<String, PipelineFailure>;
}

pub struct RemoteCommandDispatcher {
    provisioner: Arc<dyn Provisioner>,
    paths: DeployConfig,
}

impl RemoteCommandDispatcher {
    pub fn new(provisioner: Arc<dyn Provisioner>, paths: DeployConfig) -> Self {
        Self { provisioner, paths }
    }

    fn with_preamble(&self, command: &str) -> String {
        format!(
            "[ -f {env} ] && source {env}; [ -d {dir} ] && cd {dir}; {command}",
            env = self.paths.env_file,
            dir = self.paths.app_dir,
        )
    }
}

#[async_trait]
impl CommandDispatcher for RemoteCommandDispatcher {
    async fn run(&self, unit: &Unit, command: &str) -> Result<String, PipelineFailure> {
        debug!(unit = %unit.name, machine = unit.machine, "Dispatching remote command");
        match self.provisioner.execute(unit, &self.with_preamble(command)).await {
            Ok(output) => {
                metrics::counter!("stevedore_remote_commands_total", "outcome" => "success").increment(1);
                Ok(output)
            }
            Err(e) => {
                metrics::counter!("stevedore_remote_commands_total", "outcome" => "failure").increment(1);
                warn!(unit = %unit.name, error = %e, "Remote command failed");
                let output = e.output().to_string();
                Err(PipelineFailure::new(output, PlatformError::from(e)))
            }
        }
    }

    async fn run_on_app(&self, app: &App, command: &str) -> Result<String, PipelineFailure> {
        let mut output = String::new();
        for unit in app.ready_units() {
            match self.run(unit, command).await {
                Ok(out) => output.push_str(&out),
                Err(failure) => {
                    output.push_str(&failure.output);
                    return Err(PipelineFailure::new(output, failure.error));
                }
            }
        }
        Ok(output)
    }
}
