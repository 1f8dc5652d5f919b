// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! App Registry
//!
//! Keyed access to App aggregates on top of `AppRepository`, with mutations
//! serialized per app name. A mutation loads the aggregate, applies a
//! closure and writes it back while holding that name's lock, so concurrent
//! writers never lose each other's changes. The lock is never held across a
//! call to a remote collaborator: callers do remote work before or after
//! `modify`, not inside it.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::domain::app::{App, LogEntry};
use crate::domain::error::PlatformError;
use crate::domain::repository::{AppRepository, RepositoryError};

/// One async mutex per name, created on first use
#[derive(Clone, Default)]
pub struct NamedLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl NamedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop the lock entry of a name that no longer exists
    pub fn forget(&self, name: &str) {
        self.locks.remove(name);
    }
}

#[derive(Clone)]
pub struct AppRegistry {
    repository: Arc<dyn AppRepository>,
    locks: NamedLocks,
}

impl AppRegistry {
    pub fn new(repository: Arc<dyn AppRepository>) -> Self {
        Self {
            repository,
            locks: NamedLocks::new(),
        }
    }

    pub async fn find(&self, name: &str) -> Result<App, PlatformError> {
        self.repository
            .find_by_name(name)
            .await?
            .ok_or_else(|| PlatformError::app_not_found(name))
    }

    pub async fn insert(&self, app: &App) -> Result<(), PlatformError> {
        let _guard = self.locks.acquire(&app.name).await;
        self.repository.insert(app).await?;
        Ok(())
    }

    pub async fn list_by_teams(&self, teams: &[String]) -> Result<Vec<App>, PlatformError> {
        Ok(self.repository.list_by_teams(teams).await?)
    }

    pub async fn remove(&self, name: &str) -> Result<(), PlatformError> {
        {
            let _guard = self.locks.acquire(name).await;
            self.repository.remove(name).await?;
        }
        self.locks.forget(name);
        Ok(())
    }

    /// Load, mutate and store `name` under its lock.
    ///
    /// Nothing is written when `mutate` fails. Returns the stored aggregate
    /// together with the closure's result.
    pub async fn modify<T, F>(&self, name: &str, mutate: F) -> Result<(App, T), PlatformError>
    where
        F: FnOnce(&mut App) -> Result<T, PlatformError> + Send,
        T: Send,
    {
        let _guard = self.locks.acquire(name).await;
        let mut app = self.find(name).await?;
        let out = mutate(&mut app)?;
        self.repository.update(&app).await?;
        debug!(app = %name, "App aggregate updated");
        Ok((app, out))
    }

    /// Atomic log append, bypasses the per-name lock
    pub async fn append_logs(&self, name: &str, entries: Vec<LogEntry>) -> Result<(), PlatformError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.repository.append_logs(name, entries).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => PlatformError::app_not_found(name),
            other => other.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::app::EnvVar;
    use crate::infrastructure::repositories::InMemoryAppRepository;

    fn registry() -> AppRegistry {
        AppRegistry::new(Arc::new(InMemoryAppRepository::new()))
    }

    #[tokio::test]
    async fn test_find_missing_app() {
        let err = registry().find("ghost").await.unwrap_err();
        assert_eq!(err, PlatformError::app_not_found("ghost"));
    }

    #[tokio::test]
    async fn test_insert_conflict() {
        let registry = registry();
        let app = App::new("someapp", "django").unwrap();
        registry.insert(&app).await.unwrap();

        let err = registry.insert(&app).await.unwrap_err();
        assert_eq!(err, PlatformError::app_exists("someapp"));
    }

    #[tokio::test]
    async fn test_failed_mutation_is_not_stored() {
        let registry = registry();
        registry.insert(&App::new("someapp", "django").unwrap()).await.unwrap();

        let result: Result<(App, ()), _> = registry
            .modify("someapp", |app| {
                app.framework = "rails".to_string();
                Err(PlatformError::BadRequest("nope".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(registry.find("someapp").await.unwrap().framework, "django");
    }

    #[tokio::test]
    async fn test_concurrent_mutations_are_not_lost() {
        let registry = registry();
        registry.insert(&App::new("someapp", "django").unwrap()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .modify("someapp", move |app| {
                        Ok(app.set_env(vec![EnvVar::public(format!("VAR_{}", i), "x")], false))
                    })
                    .await
                    .unwrap();
                registry
                    .append_logs("someapp", vec![LogEntry::new(format!("log {}", i), "app")])
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let app = registry.find("someapp").await.unwrap();
        assert_eq!(app.env.len(), 20);
        assert_eq!(app.logs.len(), 20);
    }

    #[tokio::test]
    async fn test_append_logs_to_missing_app() {
        let err = registry()
            .append_logs("ghost", vec![LogEntry::new("hi", "app")])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
