// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process collaborators for tests and local development.
//!
//! Each fake records every call it receives and can be scripted to fail, so
//! application services can be exercised without a provisioner, repository
//! host or service backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::domain::app::{App, Unit};
use crate::domain::catalog::{CatalogError, ServiceCatalog};
use crate::domain::git::{GitServer, GitServerError};
use crate::domain::provisioner::{Provisioner, ProvisionerError};
use crate::domain::service::{Service, ServiceInstance};

// ============================================================================
// Provisioner
// ============================================================================

#[derive(Default)]
struct ProvisionerScript {
    executed: Vec<(u32, String)>,
    restarted: Vec<u32>,
    provisioned: Vec<String>,
    destroyed: Vec<String>,
    default_output: Option<String>,
    responses: Vec<(String, String)>,
    failing_machines: HashMap<u32, String>,
    failing_commands: Vec<(String, String)>,
    restart_failure: Option<String>,
    provision_failure: Option<String>,
    destroy_failure: Option<String>,
}

/// Provisioner that records commands instead of running them.
///
/// Unless scripted otherwise, `execute` echoes the command it received.
#[derive(Default)]
pub struct RecordingProvisioner {
    script: Mutex<ProvisionerScript>,
}

fn command_failed(output: &str) -> ProvisionerError {
    ProvisionerError::CommandFailed {
        output: output.to_string(),
        reason: "exit status 1".to_string(),
    }
}

impl RecordingProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output returned by every command without a more specific response
    pub fn respond_with(&self, output: &str) {
        self.script.lock().default_output = Some(output.to_string());
    }

    /// Output for commands containing `pattern`
    pub fn respond_to(&self, pattern: &str, output: &str) {
        self.script
            .lock()
            .responses
            .push((pattern.to_string(), output.to_string()));
    }

    pub fn fail_on_machine(&self, machine: u32, output: &str) {
        self.script
            .lock()
            .failing_machines
            .insert(machine, output.to_string());
    }

    /// Fail commands containing `pattern`
    pub fn fail_on_command(&self, pattern: &str, output: &str) {
        self.script
            .lock()
            .failing_commands
            .push((pattern.to_string(), output.to_string()));
    }

    pub fn fail_restart(&self, output: &str) {
        self.script.lock().restart_failure = Some(output.to_string());
    }

    pub fn fail_provision(&self, output: &str) {
        self.script.lock().provision_failure = Some(output.to_string());
    }

    pub fn fail_destroy(&self, output: &str) {
        self.script.lock().destroy_failure = Some(output.to_string());
    }

    /// `(machine, command)` pairs in execution order
    pub fn executed(&self) -> Vec<(u32, String)> {
        self.script.lock().executed.clone()
    }

    pub fn restarted(&self) -> Vec<u32> {
        self.script.lock().restarted.clone()
    }

    pub fn provisioned(&self) -> Vec<String> {
        self.script.lock().provisioned.clone()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.script.lock().destroyed.clone()
    }
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    async fn provision(&self, app: &App) -> Result<String, ProvisionerError> {
        let mut script = self.script.lock();
        if let Some(output) = &script.provision_failure {
            return Err(command_failed(output));
        }
        script.provisioned.push(app.name.clone());
        Ok(format!("deployed {}\n", app.name))
    }

    async fn execute(&self, unit: &Unit, command: &str) -> Result<String, ProvisionerError> {
        let mut script = self.script.lock();
        script.executed.push((unit.machine, command.to_string()));

        if let Some(output) = script.failing_machines.get(&unit.machine) {
            return Err(command_failed(output));
        }
        if let Some((_, output)) = script
            .failing_commands
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
        {
            return Err(command_failed(output));
        }
        if let Some((_, output)) = script
            .responses
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
        {
            return Ok(output.clone());
        }
        Ok(script
            .default_output
            .clone()
            .unwrap_or_else(|| format!("{}\n", command)))
    }

    async fn restart(&self, unit: &Unit) -> Result<String, ProvisionerError> {
        let mut script = self.script.lock();
        script.restarted.push(unit.machine);
        if let Some(output) = &script.restart_failure {
            return Err(command_failed(output));
        }
        Ok(format!("restarted {}\n", unit.name))
    }

    async fn destroy(&self, app: &App) -> Result<String, ProvisionerError> {
        let mut script = self.script.lock();
        if let Some(output) = &script.destroy_failure {
            return Err(command_failed(output));
        }
        script.destroyed.push(app.name.clone());
        Ok(format!("destroyed {}\n", app.name))
    }
}

// ============================================================================
// Repository host
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GitOperation {
    Create,
    Grant,
    Revoke,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Create { name: String, users: Vec<String> },
    Grant { repositories: Vec<String>, users: Vec<String> },
    Revoke { repositories: Vec<String>, users: Vec<String> },
    Remove { name: String },
}

pub struct FakeGitServer {
    host: String,
    calls: Mutex<Vec<GitCall>>,
    failures: Mutex<HashMap<GitOperation, String>>,
}

impl FakeGitServer {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Reject every `operation` with `message`
    pub fn fail(&self, operation: GitOperation, message: &str) {
        self.failures.lock().insert(operation, message.to_string());
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.calls.lock().clone()
    }

    fn record(&self, operation: GitOperation, call: GitCall) -> Result<(), GitServerError> {
        if let Some(message) = self.failures.lock().get(&operation) {
            return Err(GitServerError::Rejected {
                status: 500,
                message: message.clone(),
            });
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl Default for FakeGitServer {
    fn default() -> Self {
        Self::new("git.stevedore.local")
    }
}

#[async_trait]
impl GitServer for FakeGitServer {
    async fn create_repository(&self, name: &str, users: &[String]) -> Result<(), GitServerError> {
        self.record(
            GitOperation::Create,
            GitCall::Create {
                name: name.to_string(),
                users: users.to_vec(),
            },
        )
    }

    async fn grant_access(&self, repositories: &[String], users: &[String]) -> Result<(), GitServerError> {
        self.record(
            GitOperation::Grant,
            GitCall::Grant {
                repositories: repositories.to_vec(),
                users: users.to_vec(),
            },
        )
    }

    async fn revoke_access(&self, repositories: &[String], users: &[String]) -> Result<(), GitServerError> {
        self.record(
            GitOperation::Revoke,
            GitCall::Revoke {
                repositories: repositories.to_vec(),
                users: users.to_vec(),
            },
        )
    }

    async fn remove_repository(&self, name: &str) -> Result<(), GitServerError> {
        self.record(
            GitOperation::Remove,
            GitCall::Remove {
                name: name.to_string(),
            },
        )
    }

    fn clone_url(&self, name: &str) -> String {
        format!("git://{}/{}.git", self.host, name)
    }

    fn repository_url(&self, name: &str) -> String {
        format!("git@{}:{}.git", self.host, name)
    }
}

// ============================================================================
// Service catalog
// ============================================================================

#[derive(Default)]
struct CatalogScript {
    credentials: BTreeMap<String, String>,
    request_failure: Option<String>,
    release_failures_left: usize,
    requests: Vec<(String, String)>,
    release_attempts: usize,
    releases: Vec<(String, String)>,
}

#[derive(Default)]
pub struct FakeServiceCatalog {
    script: Mutex<CatalogScript>,
}

impl FakeServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials<I, K, V>(credentials: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let catalog = Self::new();
        catalog.script.lock().credentials = credentials
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        catalog
    }

    pub fn fail_requests(&self, message: &str) {
        self.script.lock().request_failure = Some(message.to_string());
    }

    /// Reject the next `count` release attempts
    pub fn fail_releases(&self, count: usize) {
        self.script.lock().release_failures_left = count;
    }

    /// `(instance, app host)` pairs credentials were requested for
    pub fn requests(&self) -> Vec<(String, String)> {
        self.script.lock().requests.clone()
    }

    /// Successful releases as `(instance, app host)`
    pub fn releases(&self) -> Vec<(String, String)> {
        self.script.lock().releases.clone()
    }

    pub fn release_attempts(&self) -> usize {
        self.script.lock().release_attempts
    }

    /// Poll until a release succeeded or `timeout` elapsed
    pub async fn wait_for_release(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.releases().is_empty() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl ServiceCatalog for FakeServiceCatalog {
    async fn request_credentials(
        &self,
        _service: &Service,
        instance: &ServiceInstance,
        app_host: &str,
    ) -> Result<BTreeMap<String, String>, CatalogError> {
        let mut script = self.script.lock();
        if let Some(message) = &script.request_failure {
            return Err(CatalogError::Rejected {
                status: 500,
                message: message.clone(),
            });
        }
        script
            .requests
            .push((instance.name.clone(), app_host.to_string()));
        Ok(script.credentials.clone())
    }

    async fn release_resource(
        &self,
        _service: &Service,
        instance: &ServiceInstance,
        app_host: &str,
    ) -> Result<(), CatalogError> {
        let mut script = self.script.lock();
        script.release_attempts += 1;
        if script.release_failures_left > 0 {
            script.release_failures_left -= 1;
            return Err(CatalogError::Request("connection refused".to_string()));
        }
        script
            .releases
            .push((instance.name.clone(), app_host.to_string()));
        Ok(())
    }
}
