// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Cluster Provisioner Interface
//!
//! The provisioner owns machines: it deploys units, runs commands on them and
//! tears them down. Unit state is reported back asynchronously and is only
//! read by the control plane.
//!
//! Implementations: `JujuProvisioner` (shells out to the `juju` client) and
//! `RecordingProvisioner` (in-process fake for tests).

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::app::{App, Unit};

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Deploy the first unit of a freshly created app
    async fn provision(&self, app: &App) -> Result<String, ProvisionerError>;

    /// Run `command` on the unit's machine, returning combined stdout+stderr
    async fn execute(&self, unit: &Unit, command: &str) -> Result<String, ProvisionerError>;

    /// Invoke the platform restart hook on the unit
    async fn restart(&self, unit: &Unit) -> Result<String, ProvisionerError>;

    /// Tear down every unit of the app
    async fn destroy(&self, app: &App) -> Result<String, ProvisionerError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionerError {
    /// The command ran and exited unsuccessfully; `output` is what it printed
    #[error("{reason}")]
    CommandFailed { output: String, reason: String },

    #[error("provisioner command timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to start provisioner client: {0}")]
    Spawn(String),
}

impl ProvisionerError {
    /// Output produced before the failure, empty when nothing ran
    pub fn output(&self) -> &str {
        match self {
            Self::CommandFailed { output, .. } => output,
            Self::Timeout(_) | Self::Spawn(_) => "",
        }
    }
}
