// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Juju Provisioner
//!
//! Shells out to the `juju` client. Every invocation is bounded by the
//! configured command timeout; a non-zero exit status is reported as a
//! failure carrying the combined output.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::app::{App, Unit};
use crate::domain::platform_config::{DeployConfig, ProvisionerConfig};
use crate::domain::provisioner::{Provisioner, ProvisionerError};

pub struct JujuProvisioner {
    binary: String,
    charms_path: String,
    hooks_dir: String,
    timeout: Duration,
}

impl JujuProvisioner {
    pub fn new(config: &ProvisionerConfig, deploy: &DeployConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            charms_path: config.charms_path.clone(),
            hooks_dir: deploy.hooks_dir.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    async fn juju(&self, args: &[&str]) -> Result<String, ProvisionerError> {
        debug!(binary = %self.binary, ?args, "Invoking provisioner client");

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                if output.status.success() {
                    Ok(combined)
                } else {
                    Err(ProvisionerError::CommandFailed {
                        reason: if combined.trim().is_empty() {
                            output.status.to_string()
                        } else {
                            combined.trim().to_string()
                        },
                        output: combined,
                    })
                }
            }
            Ok(Err(e)) => Err(ProvisionerError::Spawn(e.to_string())),
            Err(_) => {
                warn!(binary = %self.binary, ?args, "Provisioner command timed out");
                Err(ProvisionerError::Timeout(self.timeout))
            }
        }
    }

    async fn ssh(&self, machine: u32, command: &str) -> Result<String, ProvisionerError> {
        let machine = machine.to_string();
        self.juju(&[
            "ssh",
            "-o",
            "StrictHostKeyChecking no",
            "-q",
            &machine,
            command,
        ])
        .await
    }
}

#[async_trait]
impl Provisioner for JujuProvisioner {
    async fn provision(&self, app: &App) -> Result<String, ProvisionerError> {
        let repository = format!("--repository={}", self.charms_path);
        let charm = format!("local:{}", app.framework);
        self.juju(&["deploy", &repository, &charm, &app.name]).await
    }

    async fn execute(&self, unit: &Unit, command: &str) -> Result<String, ProvisionerError> {
        self.ssh(unit.machine, command).await
    }

    async fn restart(&self, unit: &Unit) -> Result<String, ProvisionerError> {
        let hook = format!("{}/restart", self.hooks_dir);
        self.ssh(unit.machine, &hook).await
    }

    async fn destroy(&self, app: &App) -> Result<String, ProvisionerError> {
        let mut output = self.juju(&["destroy-service", &app.name]).await?;
        for unit in &app.units {
            let machine = unit.machine.to_string();
            match self.juju(&["terminate-machine", &machine]).await {
                Ok(out) => output.push_str(&out),
                Err(ProvisionerError::CommandFailed { output: out, reason }) => {
                    output.push_str(&out);
                    return Err(ProvisionerError::CommandFailed { output, reason });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Stand-in `juju` that prints its arguments, one per line
    fn fake_juju(script_body: &str) -> (TempDir, ProvisionerConfig) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("juju");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script_body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = ProvisionerConfig {
            binary: path.to_string_lossy().to_string(),
            command_timeout_secs: 5,
            charms_path: "/home/charms".to_string(),
        };
        (dir, config)
    }

    fn echo_args() -> &'static str {
        r#"for arg in "$@"; do echo "$arg"; done"#
    }

    #[tokio::test]
    async fn test_execute_uses_non_interactive_ssh() {
        let (_dir, config) = fake_juju(echo_args());
        let juju = JujuProvisioner::new(&config, &DeployConfig::default());

        let output = juju
            .execute(&Unit::new("someapp/0", "django", 10), "ls -lh")
            .await
            .unwrap();
        assert_eq!(output, "ssh\n-o\nStrictHostKeyChecking no\n-q\n10\nls -lh\n");
    }

    #[tokio::test]
    async fn test_restart_runs_restart_hook() {
        let (_dir, config) = fake_juju(echo_args());
        let juju = JujuProvisioner::new(&config, &DeployConfig::default());

        let output = juju.restart(&Unit::new("someapp/0", "django", 3)).await.unwrap();
        assert!(output.ends_with("3\n/var/lib/stevedore/hooks/restart\n"));
    }

    #[tokio::test]
    async fn test_provision_and_destroy() {
        let (_dir, config) = fake_juju(echo_args());
        let juju = JujuProvisioner::new(&config, &DeployConfig::default());
        let mut app = App::new("someapp", "django").unwrap();

        let output = juju.provision(&app).await.unwrap();
        assert_eq!(output, "deploy\n--repository=/home/charms\nlocal:django\nsomeapp\n");

        app.units = vec![
            Unit::new("someapp/0", "django", 1),
            Unit::new("someapp/1", "django", 2),
        ];
        let output = juju.destroy(&app).await.unwrap();
        assert_eq!(
            output,
            "destroy-service\nsomeapp\nterminate-machine\n1\nterminate-machine\n2\n"
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_output() {
        let (_dir, config) = fake_juju("echo 'ERROR machine 7 not found' >&2; exit 1");
        let juju = JujuProvisioner::new(&config, &DeployConfig::default());

        let err = juju
            .execute(&Unit::new("someapp/0", "django", 7), "ls")
            .await
            .unwrap_err();
        assert_eq!(err.output(), "ERROR machine 7 not found\n");
        assert_eq!(err.to_string(), "ERROR machine 7 not found");
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let (_dir, mut config) = fake_juju("sleep 5");
        config.command_timeout_secs = 0;
        let juju = JujuProvisioner::new(&config, &DeployConfig::default());

        let err = juju
            .execute(&Unit::new("someapp/0", "django", 1), "ls")
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionerError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let config = ProvisionerConfig {
            binary: "/nonexistent/juju".to_string(),
            command_timeout_secs: 5,
            charms_path: "/home/charms".to_string(),
        };
        let juju = JujuProvisioner::new(&config, &DeployConfig::default());
        let err = juju
            .execute(&Unit::new("someapp/0", "django", 1), "ls")
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionerError::Spawn(_)));
    }
}
