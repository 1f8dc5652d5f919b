// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! App Lifecycle Service
//!
//! Creation, listing, destruction and team management of apps. These flows
//! touch the provisioner and the repository host as well as the registry;
//! remote calls always happen outside the per-app lock, and a failed remote
//! call undoes the local change that preceded it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::access::AccessGuard;
use crate::application::dispatcher::CommandDispatcher;
use crate::application::registry::AppRegistry;
use crate::domain::app::{App, Unit};
use crate::domain::error::{
    PipelineFailure, PlatformError, APP_UNAVAILABLE, MISSING_COMMAND, NO_TEAM_ON_CREATE,
    REPOSITORY_REMOVAL_FAILED, TEAM_NOT_FOUND,
};
use crate::domain::git::GitServer;
use crate::domain::provisioner::Provisioner;
use crate::domain::repository::TeamRepository;
use crate::domain::team::{members_of, Team, User};

/// Response of a successful app creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedApp {
    pub status: String,
    pub repository_url: String,
}

/// Public view of an app; environment values never appear here
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppInfo {
    pub name: String,
    pub framework: String,
    pub teams: Vec<String>,
    pub units: Vec<Unit>,
    pub repository: String,
}

#[async_trait]
pub trait AppService: Send + Sync {
    async fn create(&self, user: &User, name: &str, framework: &str) -> Result<CreatedApp, PlatformError>;

    async fn list(&self, user: &User) -> Result<Vec<AppInfo>, PlatformError>;

    async fn info(&self, user: &User, name: &str) -> Result<AppInfo, PlatformError>;

    async fn delete(&self, user: &User, name: &str) -> Result<(), PlatformError>;

    async fn grant_team(&self, user: &User, app: &str, team: &str) -> Result<(), PlatformError>;

    async fn revoke_team(&self, user: &User, app: &str, team: &str) -> Result<(), PlatformError>;

    /// Succeeds when every unit of the app reports started
    async fn availability(&self, name: &str) -> Result<(), PlatformError>;

    /// Replace the unit list with the provisioner's latest report
    async fn report_units(&self, name: &str, units: Vec<Unit>) -> Result<(), PlatformError>;

    async fn run_command(&self, user: &User, name: &str, command: &str) -> Result<String, PipelineFailure>;
}

pub struct StandardAppService {
    registry: AppRegistry,
    guard: AccessGuard,
    teams: Arc<dyn TeamRepository>,
    provisioner: Arc<dyn Provisioner>,
    git: Arc<dyn GitServer>,
    dispatcher: Arc<dyn CommandDispatcher>,
}

impl StandardAppService {
    pub fn new(
        registry: AppRegistry,
        guard: AccessGuard,
        teams: Arc<dyn TeamRepository>,
        provisioner: Arc<dyn Provisioner>,
        git: Arc<dyn GitServer>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Self {
        Self {
            registry,
            guard,
            teams,
            provisioner,
            git,
            dispatcher,
        }
    }

    fn info_of(&self, app: App) -> AppInfo {
        AppInfo {
            repository: self.git.repository_url(&app.name),
            name: app.name,
            framework: app.framework,
            teams: app.teams,
            units: app.units,
        }
    }

    async fn find_team(&self, name: &str) -> Result<Team, PlatformError> {
        self.teams
            .find_by_name(name)
            .await?
            .ok_or_else(|| PlatformError::NotFound(TEAM_NOT_FOUND.to_string()))
    }

    /// Provision the app and set up its repository
    async fn provision(&self, app: &App, users: &[String]) -> Result<(), PlatformError> {
        let output = self.provisioner.provision(app).await?;
        debug!(app = %app.name, output = %output.trim(), "App provisioned");
        self.git.create_repository(&app.name, users).await?;
        self.git
            .grant_access(std::slice::from_ref(&app.name), users)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AppService for StandardAppService {
    async fn create(&self, user: &User, name: &str, framework: &str) -> Result<CreatedApp, PlatformError> {
        let mut app = App::new(name, framework)?;
        let teams = self.guard.teams_of(user).await?;
        if teams.is_empty() {
            return Err(PlatformError::Forbidden(NO_TEAM_ON_CREATE.to_string()));
        }
        app.teams = teams.iter().map(|t| t.name.clone()).collect();
        self.registry.insert(&app).await?;

        let users = members_of(&teams);
        if let Err(e) = self.provision(&app, &users).await {
            warn!(app = %app.name, error = %e, "App creation failed, rolling back");
            if let Err(rollback) = self.registry.remove(&app.name).await {
                warn!(app = %app.name, error = %rollback, "Failed to roll back app record");
            }
            return Err(e);
        }

        info!(app = %app.name, framework = %app.framework, user = %user.email, "App created");
        Ok(CreatedApp {
            status: "success".to_string(),
            repository_url: self.git.repository_url(&app.name),
        })
    }

    async fn list(&self, user: &User) -> Result<Vec<AppInfo>, PlatformError> {
        let teams: Vec<String> = self
            .guard
            .teams_of(user)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        let apps = self.registry.list_by_teams(&teams).await?;
        Ok(apps.into_iter().map(|app| self.info_of(app)).collect())
    }

    async fn info(&self, user: &User, name: &str) -> Result<AppInfo, PlatformError> {
        let app = self.guard.authorized_app(name, user).await?;
        Ok(self.info_of(app))
    }

    async fn delete(&self, user: &User, name: &str) -> Result<(), PlatformError> {
        let app = self.guard.authorized_app(name, user).await?;

        let output = self.provisioner.destroy(&app).await?;
        debug!(app = %app.name, output = %output.trim(), "App destroyed");

        if let Err(e) = self.git.remove_repository(&app.name).await {
            warn!(app = %app.name, error = %e, "Repository removal failed");
            return Err(PlatformError::Upstream(REPOSITORY_REMOVAL_FAILED.to_string()));
        }

        self.registry.remove(&app.name).await?;
        info!(app = %app.name, user = %user.email, "App deleted");
        Ok(())
    }

    async fn grant_team(&self, user: &User, app: &str, team: &str) -> Result<(), PlatformError> {
        let app = self.guard.authorized_app(app, user).await?;
        let team = self.find_team(team).await?;

        let team_name = team.name.clone();
        self.registry
            .modify(&app.name, move |app| app.grant(&team_name))
            .await?;

        if let Err(e) = self
            .git
            .grant_access(std::slice::from_ref(&app.name), &team.users)
            .await
        {
            warn!(app = %app.name, team = %team.name, error = %e, "Repository grant failed, reverting");
            let team_name = team.name.clone();
            self.registry
                .modify(&app.name, move |app| {
                    app.teams.retain(|t| t != &team_name);
                    Ok(())
                })
                .await?;
            return Err(e.into());
        }

        info!(app = %app.name, team = %team.name, "Team granted access");
        Ok(())
    }

    async fn revoke_team(&self, user: &User, app: &str, team: &str) -> Result<(), PlatformError> {
        let app = self.guard.authorized_app(app, user).await?;
        let team = self.find_team(team).await?;

        let team_name = team.name.clone();
        self.registry
            .modify(&app.name, move |app| app.revoke(&team_name))
            .await?;

        if let Err(e) = self
            .git
            .revoke_access(std::slice::from_ref(&app.name), &team.users)
            .await
        {
            warn!(app = %app.name, team = %team.name, error = %e, "Repository revoke failed, reverting");
            let team_name = team.name.clone();
            self.registry
                .modify(&app.name, move |app| {
                    if !app.has_team(&team_name) {
                        app.teams.push(team_name);
                    }
                    Ok(())
                })
                .await?;
            return Err(e.into());
        }

        info!(app = %app.name, team = %team.name, "Team access revoked");
        Ok(())
    }

    async fn availability(&self, name: &str) -> Result<(), PlatformError> {
        let app = self.registry.find(name).await?;
        if app.is_available() {
            Ok(())
        } else {
            Err(PlatformError::PreconditionFailed(APP_UNAVAILABLE.to_string()))
        }
    }

    async fn report_units(&self, name: &str, units: Vec<Unit>) -> Result<(), PlatformError> {
        let count = units.len();
        self.registry
            .modify(name, move |app| {
                app.units = units;
                Ok(())
            })
            .await?;
        debug!(app = %name, units = count, "Unit report stored");
        Ok(())
    }

    async fn run_command(&self, user: &User, name: &str, command: &str) -> Result<String, PipelineFailure> {
        let command = command.trim();
        if command.is_empty() {
            return Err(PlatformError::BadRequest(MISSING_COMMAND.to_string()).into());
        }
        let app = self.guard.authorized_app(name, user).await?;
        info!(app = %app.name, user = %user.email, "Running command on units");
        self.dispatcher.run_on_app(&app, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatcher::RemoteCommandDispatcher;
    use crate::domain::app::unit_state;
    use crate::domain::error::{APP_ACCESS_DENIED, LAST_TEAM_REVOKE, TEAM_ALREADY_GRANTED};
    use crate::domain::platform_config::DeployConfig;
    use crate::infrastructure::fakes::{FakeGitServer, GitCall, GitOperation, RecordingProvisioner};
    use crate::infrastructure::repositories::{InMemoryAppRepository, InMemoryTeamRepository};

    struct Fixture {
        apps: StandardAppService,
        registry: AppRegistry,
        provisioner: Arc<RecordingProvisioner>,
        git: Arc<FakeGitServer>,
        user: User,
    }

    async fn fixture() -> Fixture {
        let registry = AppRegistry::new(Arc::new(InMemoryAppRepository::new()));
        let teams = Arc::new(InMemoryTeamRepository::new());
        teams
            .save(&Team::new(
                "tsuruteam",
                vec!["cidade@eu.com".into(), "ana@eu.com".into()],
            ))
            .await
            .unwrap();
        teams
            .save(&Team::new("ops", vec!["cidade@eu.com".into(), "ops@eu.com".into()]))
            .await
            .unwrap();
        teams
            .save(&Team::new("outsiders", vec!["other@eu.com".into()]))
            .await
            .unwrap();

        let provisioner = Arc::new(RecordingProvisioner::new());
        let git = Arc::new(FakeGitServer::default());
        let dispatcher = Arc::new(RemoteCommandDispatcher::new(
            provisioner.clone(),
            DeployConfig::default(),
        ));
        Fixture {
            apps: StandardAppService::new(
                registry.clone(),
                AccessGuard::new(registry.clone(), teams.clone()),
                teams,
                provisioner.clone(),
                git.clone(),
                dispatcher,
            ),
            registry,
            provisioner,
            git,
            user: User::new("cidade@eu.com"),
        }
    }

    async fn insert_app(registry: &AppRegistry, name: &str, teams: &[&str]) {
        let mut app = App::new(name, "django").unwrap();
        app.teams = teams.iter().map(|t| t.to_string()).collect();
        registry.insert(&app).await.unwrap();
    }

    fn started_unit(machine: u32) -> Unit {
        Unit {
            ip: format!("10.10.10.{}", machine),
            agent_state: unit_state::STARTED.into(),
            machine_agent_state: unit_state::RUNNING.into(),
            instance_state: unit_state::RUNNING.into(),
            ..Unit::new(format!("someapp/{}", machine), "django", machine)
        }
    }

    #[tokio::test]
    async fn test_create_app() {
        let f = fixture().await;

        let created = f.apps.create(&f.user, "someapp", "django").await.unwrap();
        assert_eq!(
            created,
            CreatedApp {
                status: "success".into(),
                repository_url: "git@git.stevedore.local:someapp.git".into(),
            }
        );

        let app = f.registry.find("someapp").await.unwrap();
        assert_eq!(app.teams, vec!["ops", "tsuruteam"]);
        assert_eq!(f.provisioner.provisioned(), vec!["someapp"]);

        let users: Vec<String> = vec!["cidade@eu.com".into(), "ops@eu.com".into(), "ana@eu.com".into()];
        assert_eq!(
            f.git.calls(),
            vec![
                GitCall::Create {
                    name: "someapp".into(),
                    users: users.clone(),
                },
                GitCall::Grant {
                    repositories: vec!["someapp".into()],
                    users,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_create_validates_name_and_membership() {
        let f = fixture().await;

        let err = f.apps.create(&f.user, "123myapp", "django").await.unwrap_err();
        assert_eq!(err.status_code(), 412);

        let err = f
            .apps
            .create(&User::new("loner@eu.com"), "someapp", "django")
            .await
            .unwrap_err();
        assert_eq!(err, PlatformError::Forbidden(NO_TEAM_ON_CREATE.to_string()));

        insert_app(&f.registry, "taken", &["ops"]).await;
        let err = f.apps.create(&f.user, "taken", "django").await.unwrap_err();
        assert_eq!(err, PlatformError::app_exists("taken"));
        assert!(f.provisioner.provisioned().is_empty());
    }

    #[tokio::test]
    async fn test_create_rolls_back_on_repository_failure() {
        let f = fixture().await;
        f.git.fail(GitOperation::Create, "repository host is down");

        let err = f.apps.create(&f.user, "someapp", "django").await.unwrap_err();
        assert_eq!(err, PlatformError::Upstream("repository host is down".into()));
        assert_eq!(
            f.registry.find("someapp").await.unwrap_err(),
            PlatformError::app_not_found("someapp")
        );
    }

    #[tokio::test]
    async fn test_create_rolls_back_on_provision_failure() {
        let f = fixture().await;
        f.provisioner.fail_provision("charm not found");

        let err = f.apps.create(&f.user, "someapp", "django").await.unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(f.registry.find("someapp").await.is_err());
        assert!(f.git.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_only_visible_apps() {
        let f = fixture().await;
        insert_app(&f.registry, "mine", &["tsuruteam"]).await;
        insert_app(&f.registry, "theirs", &["outsiders"]).await;

        let apps = f.apps.list(&f.user).await.unwrap();
        let names: Vec<&str> = apps.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["mine"]);
        assert_eq!(apps[0].repository, "git@git.stevedore.local:mine.git");

        assert!(f.apps.list(&User::new("loner@eu.com")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_info_serializes_pascal_case() {
        let f = fixture().await;
        insert_app(&f.registry, "mine", &["tsuruteam"]).await;

        let info = f.apps.info(&f.user, "mine").await.unwrap();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["Name"], "mine");
        assert_eq!(json["Repository"], "git@git.stevedore.local:mine.git");
        assert!(json.get("Env").is_none());
    }

    #[tokio::test]
    async fn test_delete_app() {
        let f = fixture().await;
        insert_app(&f.registry, "mine", &["tsuruteam"]).await;

        f.apps.delete(&f.user, "mine").await.unwrap();

        assert_eq!(f.provisioner.destroyed(), vec!["mine"]);
        assert_eq!(f.git.calls(), vec![GitCall::Remove { name: "mine".into() }]);
        assert!(f.registry.find("mine").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_aborts_when_repository_removal_fails() {
        let f = fixture().await;
        insert_app(&f.registry, "mine", &["tsuruteam"]).await;
        f.git.fail(GitOperation::Remove, "boom");

        let err = f.apps.delete(&f.user, "mine").await.unwrap_err();
        assert_eq!(err, PlatformError::Upstream(REPOSITORY_REMOVAL_FAILED.into()));
        assert!(f.registry.find("mine").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_requires_access() {
        let f = fixture().await;
        insert_app(&f.registry, "theirs", &["outsiders"]).await;
        let err = f.apps.delete(&f.user, "theirs").await.unwrap_err();
        assert_eq!(err, PlatformError::Forbidden(APP_ACCESS_DENIED.into()));
        assert!(f.provisioner.destroyed().is_empty());
    }

    #[tokio::test]
    async fn test_grant_and_revoke_team() {
        let f = fixture().await;
        insert_app(&f.registry, "mine", &["tsuruteam"]).await;

        f.apps.grant_team(&f.user, "mine", "outsiders").await.unwrap();
        assert_eq!(
            f.registry.find("mine").await.unwrap().teams,
            vec!["tsuruteam", "outsiders"]
        );

        let err = f.apps.grant_team(&f.user, "mine", "outsiders").await.unwrap_err();
        assert_eq!(err, PlatformError::Conflict(TEAM_ALREADY_GRANTED.into()));

        f.apps.revoke_team(&f.user, "mine", "tsuruteam").await.unwrap();
        let err = f.apps.revoke_team(&User::new("other@eu.com"), "mine", "outsiders").await.unwrap_err();
        assert_eq!(err, PlatformError::Forbidden(LAST_TEAM_REVOKE.into()));

        assert_eq!(
            f.git.calls(),
            vec![
                GitCall::Grant {
                    repositories: vec!["mine".into()],
                    users: vec!["other@eu.com".into()],
                },
                GitCall::Revoke {
                    repositories: vec!["mine".into()],
                    users: vec!["cidade@eu.com".into(), "ana@eu.com".into()],
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_grant_unknown_team() {
        let f = fixture().await;
        insert_app(&f.registry, "mine", &["tsuruteam"]).await;
        let err = f.apps.grant_team(&f.user, "mine", "ghosts").await.unwrap_err();
        assert_eq!(err, PlatformError::NotFound(TEAM_NOT_FOUND.into()));
    }

    #[tokio::test]
    async fn test_grant_is_reverted_when_repository_host_fails() {
        let f = fixture().await;
        insert_app(&f.registry, "mine", &["tsuruteam"]).await;
        f.git.fail(GitOperation::Grant, "cannot grant");

        let err = f.apps.grant_team(&f.user, "mine", "ops").await.unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert_eq!(f.registry.find("mine").await.unwrap().teams, vec!["tsuruteam"]);
    }

    #[tokio::test]
    async fn test_revoke_is_reverted_when_repository_host_fails() {
        let f = fixture().await;
        insert_app(&f.registry, "mine", &["tsuruteam", "ops"]).await;
        f.git.fail(GitOperation::Revoke, "cannot revoke");

        let err = f.apps.revoke_team(&f.user, "mine", "ops").await.unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert_eq!(f.registry.find("mine").await.unwrap().teams, vec!["tsuruteam", "ops"]);
    }

    #[tokio::test]
    async fn test_availability_and_unit_reports() {
        let f = fixture().await;
        insert_app(&f.registry, "someapp", &["tsuruteam"]).await;

        let err = f.apps.availability("someapp").await.unwrap_err();
        assert_eq!(err, PlatformError::PreconditionFailed(APP_UNAVAILABLE.into()));

        f.apps
            .report_units("someapp", vec![started_unit(1)])
            .await
            .unwrap();
        f.apps.availability("someapp").await.unwrap();

        let err = f.apps.availability("ghost").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_run_command() {
        let f = fixture().await;
        insert_app(&f.registry, "someapp", &["tsuruteam"]).await;
        f.apps
            .report_units("someapp", vec![started_unit(1), started_unit(2)])
            .await
            .unwrap();
        f.provisioner.respond_with("lots of files\n");

        let output = f.apps.run_command(&f.user, "someapp", "ls -lh").await.unwrap();
        assert_eq!(output, "lots of files\nlots of files\n");

        let failure = f.apps.run_command(&f.user, "someapp", "  ").await.unwrap_err();
        assert_eq!(failure.error, PlatformError::BadRequest(MISSING_COMMAND.into()));
    }
}
