// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deployment Pipeline
//!
//! A linear sequence of remote stages driven through the command dispatcher:
//!
//! ```text
//! Start -> CloneOrPull -> InstallDependencies -> [PreRestart] -> Restart -> [PosRestart] -> Done
//! ```
//!
//! Every stage writes a banner and its output to a single transcript. The
//! first failing stage stops the pipeline; the transcript gathered so far is
//! returned inside the [`PipelineFailure`]. A successful full deploy also
//! records its milestone banners in the app log.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::access::AccessGuard;
use crate::application::dispatcher::CommandDispatcher;
use crate::application::registry::AppRegistry;
use crate::domain::app::{App, LogEntry};
use crate::domain::error::{PipelineFailure, PlatformError, RESTART_WITHOUT_IP};
use crate::domain::git::GitServer;
use crate::domain::hooks::HookManifest;
use crate::domain::platform_config::DeployConfig;
use crate::domain::provisioner::Provisioner;
use crate::domain::team::User;

/// Source tag of log entries written by the platform itself
pub const PLATFORM_LOG_SOURCE: &str = "stevedore";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Start,
    CloneOrPull,
    InstallDependencies,
    PreRestart,
    Restart,
    PosRestart,
    Done,
}

impl PipelineStage {
    pub fn banner(&self) -> &'static str {
        match self {
            Self::Start => " ---> Stevedore receiving push",
            Self::CloneOrPull => " ---> Cloning your code in your machines",
            Self::InstallDependencies => " ---> Installing dependencies",
            Self::PreRestart => " ---> Running pre-restart",
            Self::Restart => " ---> Restarting your app",
            Self::PosRestart => " ---> Running pos-restart",
            Self::Done => " ---> Deploy done!",
        }
    }

    /// Stages whose banner is kept in the app log after a full deploy
    fn is_milestone(&self) -> bool {
        matches!(
            self,
            Self::Start | Self::CloneOrPull | Self::InstallDependencies | Self::Done
        )
    }
}

/// Accumulated pipeline output
#[derive(Debug, Default)]
pub struct Transcript {
    text: String,
    milestones: Vec<PipelineStage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, stage: PipelineStage) {
        self.text.push('\n');
        self.text.push_str(stage.banner());
        self.text.push('\n');
        if stage == PipelineStage::Done {
            self.text.push('\n');
        }
        if stage.is_milestone() {
            self.milestones.push(stage);
        }
    }

    pub fn push(&mut self, output: &str) {
        self.text.push_str(output);
    }

    /// Fold a stage result in, keeping its output either way
    fn absorb(&mut self, result: Result<String, PipelineFailure>) -> Result<(), PlatformError> {
        match result {
            Ok(output) => {
                self.push(&output);
                Ok(())
            }
            Err(failure) => {
                self.push(&failure.output);
                Err(failure.error)
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    fn milestone_logs(&self) -> Vec<LogEntry> {
        self.milestones
            .iter()
            .map(|stage| LogEntry::new(stage.banner(), PLATFORM_LOG_SOURCE))
            .collect()
    }
}

#[async_trait]
pub trait DeploymentService: Send + Sync {
    /// Full pipeline, triggered by the repository host after a push
    async fn deploy(&self, app: &str) -> Result<String, PipelineFailure>;

    /// Restart stage only
    async fn restart(&self, user: &User, app: &str) -> Result<String, PipelineFailure>;
}

pub struct DeploymentPipeline {
    registry: AppRegistry,
    guard: AccessGuard,
    dispatcher: Arc<dyn CommandDispatcher>,
    provisioner: Arc<dyn Provisioner>,
    git: Arc<dyn GitServer>,
    paths: DeployConfig,
}

impl DeploymentPipeline {
    pub fn new(
        registry: AppRegistry,
        guard: AccessGuard,
        dispatcher: Arc<dyn CommandDispatcher>,
        provisioner: Arc<dyn Provisioner>,
        git: Arc<dyn GitServer>,
        paths: DeployConfig,
    ) -> Self {
        Self {
            registry,
            guard,
            dispatcher,
            provisioner,
            git,
            paths,
        }
    }

    async fn run_full(&self, app: &App, transcript: &mut Transcript) -> Result<(), PlatformError> {
        transcript.enter(PipelineStage::Start);

        transcript.enter(PipelineStage::CloneOrPull);
        self.clone_or_pull(app, transcript).await?;

        transcript.enter(PipelineStage::InstallDependencies);
        debug!(app = %app.name, "executing hook dependencies");
        let command = self.paths.hook_path("dependencies");
        transcript.absorb(self.dispatcher.run_on_app(app, &command).await)?;

        let hooks = self.discover_hooks(app).await?;

        if !hooks.pre_restart.is_empty() {
            transcript.enter(PipelineStage::PreRestart);
            debug!(app = %app.name, "Executing pre-restart hook");
            self.run_hooks(app, &hooks.pre_restart, transcript).await?;
        }

        transcript.enter(PipelineStage::Restart);
        self.restart_units(app, transcript).await?;

        if !hooks.pos_restart.is_empty() {
            transcript.enter(PipelineStage::PosRestart);
            debug!(app = %app.name, "Executing pos-restart hook");
            self.run_hooks(app, &hooks.pos_restart, transcript).await?;
        }

        transcript.enter(PipelineStage::Done);
        Ok(())
    }

    /// Clone into the release directory, pulling where a clone already exists
    async fn clone_or_pull(&self, app: &App, transcript: &mut Transcript) -> Result<(), PlatformError> {
        let clone = format!(
            "git clone {} {} --depth 1",
            self.git.clone_url(&app.name),
            self.paths.app_dir
        );
        let pull = format!(
            "cd {} && git pull origin {}",
            self.paths.app_dir, self.paths.branch
        );

        for unit in app.ready_units() {
            debug!(app = %app.name, unit = %unit.name, "executing git clone");
            match self.dispatcher.run(unit, &clone).await {
                Ok(output) => transcript.push(&output),
                Err(failure) => {
                    transcript.push(&failure.output);
                    debug!(app = %app.name, unit = %unit.name, "Clone failed, pulling instead");
                    transcript.absorb(self.dispatcher.run(unit, &pull).await)?;
                }
            }
        }
        Ok(())
    }

    /// Read the hook manifest from the deployed code on the first ready unit
    async fn discover_hooks(&self, app: &App) -> Result<HookManifest, PlatformError> {
        let Some(unit) = app.ready_units().next() else {
            return Ok(HookManifest::default());
        };
        let command = format!("cat {}", self.paths.manifest_path());
        match self.dispatcher.run(unit, &command).await {
            Ok(content) => Ok(HookManifest::parse(&content)?),
            Err(failure) => {
                debug!(app = %app.name, error = %failure.error, "No hook manifest found");
                Ok(HookManifest::default())
            }
        }
    }

    async fn run_hooks(
        &self,
        app: &App,
        commands: &[String],
        transcript: &mut Transcript,
    ) -> Result<(), PlatformError> {
        for command in commands {
            transcript.absorb(self.dispatcher.run_on_app(app, command).await)?;
        }
        Ok(())
    }

    async fn restart_units(&self, app: &App, transcript: &mut Transcript) -> Result<(), PlatformError> {
        debug!(app = %app.name, "executing hook to restart");
        for unit in app.ready_units() {
            match self.provisioner.restart(unit).await {
                Ok(output) => transcript.push(&output),
                Err(e) => {
                    transcript.push(e.output());
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn require_ips(app: &App) -> Result<(), PlatformError> {
        if app.all_units_have_ip() {
            Ok(())
        } else {
            Err(PlatformError::PreconditionFailed(RESTART_WITHOUT_IP.to_string()))
        }
    }

    /// Record the outcome and turn the transcript into the caller's result
    fn finish(
        app: &App,
        kind: &'static str,
        transcript: Transcript,
        result: Result<(), PlatformError>,
    ) -> Result<String, PipelineFailure> {
        match result {
            Ok(()) => {
                metrics::counter!("stevedore_deployments_total", "kind" => kind, "outcome" => "success")
                    .increment(1);
                info!(app = %app.name, kind, "Pipeline finished");
                Ok(transcript.into_string())
            }
            Err(error) => {
                metrics::counter!("stevedore_deployments_total", "kind" => kind, "outcome" => "failure")
                    .increment(1);
                warn!(app = %app.name, kind, error = %error, "Pipeline failed");
                Err(PipelineFailure::new(transcript.into_string(), error))
            }
        }
    }
}

#[async_trait]
impl DeploymentService for DeploymentPipeline {
    async fn deploy(&self, app: &str) -> Result<String, PipelineFailure> {
        let app = self.registry.find(app).await?;
        info!(app = %app.name, units = app.units.len(), "Starting deploy pipeline");

        let mut transcript = Transcript::new();
        let result = self.run_full(&app, &mut transcript).await;
        if result.is_ok() {
            if let Err(e) = self
                .registry
                .append_logs(&app.name, transcript.milestone_logs())
                .await
            {
                warn!(app = %app.name, error = %e, "Failed to record deploy logs");
            }
        }
        Self::finish(&app, "deploy", transcript, result)
    }

    async fn restart(&self, user: &User, app: &str) -> Result<String, PipelineFailure> {
        let app = self.guard.authorized_app(app, user).await?;
        Self::require_ips(&app)?;
        info!(app = %app.name, "Restarting app");

        let mut transcript = Transcript::new();
        transcript.enter(PipelineStage::Restart);
        let result = self.restart_units(&app, &mut transcript).await;
        Self::finish(&app, "restart", transcript, result)
    }
}
