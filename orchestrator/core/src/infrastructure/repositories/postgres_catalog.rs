// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Team and Service Repositories
//!
//! Teams, services and service instances are small records upserted by name.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::repository::{
    RepositoryError, ServiceInstanceRepository, ServiceRepository, TeamRepository,
};
use crate::domain::service::{Service, ServiceInstance};
use crate::domain::team::Team;

fn team_from_row(row: &PgRow) -> Team {
    Team {
        name: row.get("name"),
        users: row.get("users"),
    }
}

pub struct PostgresTeamRepository {
    pool: PgPool,
}

impl PostgresTeamRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TeamRepository for PostgresTeamRepository {
    async fn save(&self, team: &Team) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO teams (name, users)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET users = EXCLUDED.users
            "#,
        )
        .bind(&team.name)
        .bind(&team.users)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save team: {}", e)))?;
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Team>, RepositoryError> {
        let row = sqlx::query("SELECT name, users FROM teams WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(row.as_ref().map(team_from_row))
    }

    async fn find_by_user(&self, email: &str) -> Result<Vec<Team>, RepositoryError> {
        let rows = sqlx::query("SELECT name, users FROM teams WHERE $1 = ANY(users) ORDER BY name")
            .bind(email)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(rows.iter().map(team_from_row).collect())
    }
}

pub struct PostgresServiceRepository {
    pool: PgPool,
}

impl PostgresServiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceRepository for PostgresServiceRepository {
    async fn save(&self, service: &Service) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO services (name, endpoint)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET endpoint = EXCLUDED.endpoint
            "#,
        )
        .bind(&service.name)
        .bind(&service.endpoint)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save service: {}", e)))?;
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Service>, RepositoryError> {
        let row = sqlx::query("SELECT name, endpoint FROM services WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(row.map(|row| Service {
            name: row.get("name"),
            endpoint: row.get("endpoint"),
        }))
    }
}

pub struct PostgresServiceInstanceRepository {
    pool: PgPool,
}

impl PostgresServiceInstanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceInstanceRepository for PostgresServiceInstanceRepository {
    async fn save(&self, instance: &ServiceInstance) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO service_instances (name, service_name, teams, apps)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE SET
                service_name = EXCLUDED.service_name,
                teams = EXCLUDED.teams,
                apps = EXCLUDED.apps
            "#,
        )
        .bind(&instance.name)
        .bind(&instance.service_name)
        .bind(&instance.teams)
        .bind(&instance.apps)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save service instance: {}", e)))?;
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ServiceInstance>, RepositoryError> {
        let row = sqlx::query(
            "SELECT name, service_name, teams, apps FROM service_instances WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(row.map(|row| ServiceInstance {
            name: row.get("name"),
            service_name: row.get("service_name"),
            teams: row.get("teams"),
            apps: row.get("apps"),
        }))
    }
}
