// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository abstractions defined in
//! the domain layer, following the Repository pattern from DDD.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresAppRepository** - App documents plus an append-only log table
//! - **PostgresTeamRepository**, **PostgresServiceRepository**,
//!   **PostgresServiceInstanceRepository** - identity and catalog documents
//!
//! ## In-Memory Repositories
//!
//! `parking_lot::RwLock<HashMap>` backed storage for development and tests.
//! Locks are only held for the duration of a map operation.

pub mod postgres_app;
pub mod postgres_catalog;

pub use postgres_app::PostgresAppRepository;
pub use postgres_catalog::{
    PostgresServiceInstanceRepository, PostgresServiceRepository, PostgresTeamRepository,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::app::{App, LogEntry};
use crate::domain::repository::{
    AppRepository, RepositoryError, ServiceInstanceRepository, ServiceRepository, TeamRepository,
};
use crate::domain::service::{Service, ServiceInstance};
use crate::domain::team::Team;

#[derive(Clone, Default)]
pub struct InMemoryAppRepository {
    apps: Arc<RwLock<HashMap<String, App>>>,
}

impl InMemoryAppRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppRepository for InMemoryAppRepository {
    async fn insert(&self, app: &App) -> Result<(), RepositoryError> {
        let mut apps = self.apps.write();
        if apps.contains_key(&app.name) {
            return Err(RepositoryError::AlreadyExists(app.name.clone()));
        }
        apps.insert(app.name.clone(), app.clone());
        Ok(())
    }

    async fn update(&self, app: &App) -> Result<(), RepositoryError> {
        let mut apps = self.apps.write();
        let stored = apps
            .get_mut(&app.name)
            .ok_or_else(|| RepositoryError::NotFound(app.name.clone()))?;
        let logs = std::mem::take(&mut stored.logs);
        *stored = App {
            logs,
            ..app.clone()
        };
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<App>, RepositoryError> {
        Ok(self.apps.read().get(name).cloned())
    }

    async fn list_by_teams(&self, teams: &[String]) -> Result<Vec<App>, RepositoryError> {
        let apps = self.apps.read();
        let mut visible: Vec<App> = apps
            .values()
            .filter(|app| app.teams.iter().any(|t| teams.contains(t)))
            .cloned()
            .collect();
        visible.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(visible)
    }

    async fn remove(&self, name: &str) -> Result<(), RepositoryError> {
        self.apps.write().remove(name);
        Ok(())
    }

    async fn append_logs(&self, name: &str, entries: Vec<LogEntry>) -> Result<(), RepositoryError> {
        let mut apps = self.apps.write();
        let app = apps
            .get_mut(name)
            .ok_or_else(|| RepositoryError::NotFound(name.to_string()))?;
        app.push_logs(entries);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTeamRepository {
    teams: Arc<RwLock<HashMap<String, Team>>>,
}

impl InMemoryTeamRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TeamRepository for InMemoryTeamRepository {
    async fn save(&self, team: &Team) -> Result<(), RepositoryError> {
        self.teams.write().insert(team.name.clone(), team.clone());
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Team>, RepositoryError> {
        Ok(self.teams.read().get(name).cloned())
    }

    async fn find_by_user(&self, email: &str) -> Result<Vec<Team>, RepositoryError> {
        let mut teams: Vec<Team> = self
            .teams
            .read()
            .values()
            .filter(|t| t.contains_user(email))
            .cloned()
            .collect();
        teams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(teams)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryServiceRepository {
    services: Arc<RwLock<HashMap<String, Service>>>,
}

impl InMemoryServiceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceRepository for InMemoryServiceRepository {
    async fn save(&self, service: &Service) -> Result<(), RepositoryError> {
        self.services.write().insert(service.name.clone(), service.clone());
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Service>, RepositoryError> {
        Ok(self.services.read().get(name).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryServiceInstanceRepository {
    instances: Arc<RwLock<HashMap<String, ServiceInstance>>>,
}

impl InMemoryServiceInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceInstanceRepository for InMemoryServiceInstanceRepository {
    async fn save(&self, instance: &ServiceInstance) -> Result<(), RepositoryError> {
        self.instances.write().insert(instance.name.clone(), instance.clone());
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ServiceInstance>, RepositoryError> {
        Ok(self.instances.read().get(name).cloned())
    }
}
