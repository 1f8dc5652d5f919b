// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate, one repository per aggregate,
//! defined in the domain layer and implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `AppRepository` | `App` | `InMemoryAppRepository`, `PostgresAppRepository` |
//! | `TeamRepository` | `Team` | `InMemoryTeamRepository`, `PostgresTeamRepository` |
//! | `ServiceRepository` | `Service` | `InMemoryServiceRepository`, `PostgresServiceRepository` |
//! | `ServiceInstanceRepository` | `ServiceInstance` | `InMemoryServiceInstanceRepository`, `PostgresServiceInstanceRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! The backend is selected at startup from `spec.database` in the control
//! plane configuration: in-memory when no URL is configured, PostgreSQL
//! otherwise.

use async_trait::async_trait;

use crate::domain::app::{App, LogEntry};
use crate::domain::service::{Service, ServiceInstance};
use crate::domain::team::Team;

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Repository interface for App aggregates.
///
/// `update` replaces the whole aggregate except its log; callers serialize
/// load-mutate-store per app name. The log only grows through `append_logs`,
/// which is atomic at the store layer, so an append racing an update is
/// never lost.
#[async_trait]
pub trait AppRepository: Send + Sync {
    /// Insert a new app, failing with `AlreadyExists` on a name clash
    async fn insert(&self, app: &App) -> Result<(), RepositoryError>;

    /// Replace the stored aggregate with the same name, keeping its log
    async fn update(&self, app: &App) -> Result<(), RepositoryError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<App>, RepositoryError>;

    /// Apps granted to any of `teams`, ordered by name
    async fn list_by_teams(&self, teams: &[String]) -> Result<Vec<App>, RepositoryError>;

    async fn remove(&self, name: &str) -> Result<(), RepositoryError>;

    async fn append_logs(&self, name: &str, entries: Vec<LogEntry>) -> Result<(), RepositoryError>;
}

/// Read access to the identity subsystem's teams
#[async_trait]
pub trait TeamRepository: Send + Sync {
    async fn save(&self, team: &Team) -> Result<(), RepositoryError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Team>, RepositoryError>;

    /// Teams `email` belongs to, ordered by name
    async fn find_by_user(&self, email: &str) -> Result<Vec<Team>, RepositoryError>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn save(&self, service: &Service) -> Result<(), RepositoryError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Service>, RepositoryError>;
}

#[async_trait]
pub trait ServiceInstanceRepository: Send + Sync {
    async fn save(&self, instance: &ServiceInstance) -> Result<(), RepositoryError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<ServiceInstance>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
