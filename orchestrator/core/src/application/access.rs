// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Authorization Guard
//!
//! A user may operate on an app when they belong to any team the app is
//! granted to. Lookups and the access check run before any side effect, so a
//! rejected request never leaves partial state behind.

use std::sync::Arc;
use tracing::debug;

use crate::application::registry::AppRegistry;
use crate::domain::app::App;
use crate::domain::error::{PlatformError, APP_ACCESS_DENIED};
use crate::domain::repository::TeamRepository;
use crate::domain::team::{Team, User};

#[derive(Clone)]
pub struct AccessGuard {
    registry: AppRegistry,
    teams: Arc<dyn TeamRepository>,
}

impl AccessGuard {
    pub fn new(registry: AppRegistry, teams: Arc<dyn TeamRepository>) -> Self {
        Self { registry, teams }
    }

    /// Teams the user is a member of
    pub async fn teams_of(&self, user: &User) -> Result<Vec<Team>, PlatformError> {
        Ok(self.teams.find_by_user(&user.email).await?)
    }

    pub async fn can_access(&self, app: &App, user: &User) -> Result<bool, PlatformError> {
        let teams = self.teams_of(user).await?;
        Ok(app.is_accessible_by(user, &teams))
    }

    pub async fn check_access(&self, app: &App, user: &User) -> Result<(), PlatformError> {
        self.check_access_with(app, user, APP_ACCESS_DENIED).await
    }

    /// Same check, failing with a caller-chosen message
    pub async fn check_access_with(
        &self,
        app: &App,
        user: &User,
        denied: &str,
    ) -> Result<(), PlatformError> {
        if self.can_access(app, user).await? {
            Ok(())
        } else {
            debug!(app = %app.name, user = %user.email, "Access denied");
            Err(PlatformError::Forbidden(denied.to_string()))
        }
    }

    /// Find the app and check the user may operate on it
    pub async fn authorized_app(&self, name: &str, user: &User) -> Result<App, PlatformError> {
        let app = self.registry.find(name).await?;
        self.check_access(&app, user).await?;
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::{InMemoryAppRepository, InMemoryTeamRepository};

    async fn guard_with_app(app_teams: &[&str]) -> AccessGuard {
        let registry = AppRegistry::new(Arc::new(InMemoryAppRepository::new()));
        let teams = Arc::new(InMemoryTeamRepository::new());
        teams
            .save(&Team::new("tsuruteam", vec!["cidade@eu.com".into()]))
            .await
            .unwrap();
        teams
            .save(&Team::new("outsiders", vec!["other@eu.com".into()]))
            .await
            .unwrap();

        let mut app = App::new("someapp", "django").unwrap();
        app.teams = app_teams.iter().map(|t| t.to_string()).collect();
        registry.insert(&app).await.unwrap();

        AccessGuard::new(registry, teams)
    }

    #[tokio::test]
    async fn test_member_is_authorized() {
        let guard = guard_with_app(&["tsuruteam"]).await;
        let app = guard
            .authorized_app("someapp", &User::new("cidade@eu.com"))
            .await
            .unwrap();
        assert_eq!(app.name, "someapp");
    }

    #[tokio::test]
    async fn test_non_member_is_forbidden() {
        let guard = guard_with_app(&["tsuruteam"]).await;
        let err = guard
            .authorized_app("someapp", &User::new("other@eu.com"))
            .await
            .unwrap_err();
        assert_eq!(err, PlatformError::Forbidden(APP_ACCESS_DENIED.to_string()));
    }

    #[tokio::test]
    async fn test_missing_app_is_reported_before_access() {
        let guard = guard_with_app(&["tsuruteam"]).await;
        let err = guard
            .authorized_app("ghost", &User::new("other@eu.com"))
            .await
            .unwrap_err();
        assert_eq!(err, PlatformError::app_not_found("ghost"));
    }
}
