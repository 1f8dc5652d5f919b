// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL App Repository
//!
//! Each app is a JSONB document in `apps`, keyed by name, with its team list
//! mirrored into a `TEXT[]` column for visibility queries. The log lives in
//! the append-only `app_logs` table, so replacing the document never touches
//! it and concurrent appends serialize on the app row lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::HashMap;

use crate::domain::app::{App, LogEntry};
use crate::domain::repository::{AppRepository, RepositoryError};

pub struct PostgresAppRepository {
    pool: PgPool,
}

impl PostgresAppRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(document: serde_json::Value, logs: Vec<LogEntry>) -> Result<App, RepositoryError> {
        let mut app: App = serde_json::from_value(document)
            .map_err(|e| RepositoryError::Serialization(format!("Failed to deserialize app: {}", e)))?;
        app.logs = logs;
        Ok(app)
    }

    async fn logs_of(&self, names: &[String]) -> Result<HashMap<String, Vec<LogEntry>>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT app_name, date, message, source
            FROM app_logs
            WHERE app_name = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to load app logs: {}", e)))?;

        let mut logs: HashMap<String, Vec<LogEntry>> = HashMap::new();
        for row in rows {
            logs.entry(row.get("app_name")).or_default().push(LogEntry {
                date: row.get("date"),
                message: row.get("message"),
                source: row.get("source"),
            });
        }
        Ok(logs)
    }
}

/// The stored document: the aggregate without its log
fn document_of(app: &App) -> Result<serde_json::Value, RepositoryError> {
    let stored = App {
        logs: Vec::new(),
        ..app.clone()
    };
    Ok(serde_json::to_value(&stored)?)
}

/// Clamp entry dates so they never precede `last` or each other
fn clamp_dates(last: Option<DateTime<Utc>>, entries: &mut [LogEntry]) {
    let mut floor = last;
    for entry in entries.iter_mut() {
        if let Some(floor) = floor {
            if entry.date < floor {
                entry.date = floor;
            }
        }
        floor = Some(entry.date);
    }
}

#[async_trait]
impl AppRepository for PostgresAppRepository {
    async fn insert(&self, app: &App) -> Result<(), RepositoryError> {
        let document = document_of(app)?;

        let result = sqlx::query(
            r#"
            INSERT INTO apps (name, teams, document, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(&app.name)
        .bind(&app.teams)
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert app: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::AlreadyExists(app.name.clone()));
        }
        if !app.logs.is_empty() {
            self.append_logs(&app.name, app.logs.clone()).await?;
        }
        Ok(())
    }

    async fn update(&self, app: &App) -> Result<(), RepositoryError> {
        let document = document_of(app)?;

        let result = sqlx::query(
            r#"
            UPDATE apps
            SET teams = $2, document = $3, updated_at = NOW()
            WHERE name = $1
            "#,
        )
        .bind(&app.name)
        .bind(&app.teams)
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to update app: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(app.name.clone()));
        }
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<App>, RepositoryError> {
        let row = sqlx::query("SELECT document FROM apps WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let names = [name.to_string()];
        let logs = self.logs_of(&names).await?.remove(name).unwrap_or_default();
        Ok(Some(Self::decode(row.get("document"), logs)?))
    }

    async fn list_by_teams(&self, teams: &[String]) -> Result<Vec<App>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT name, document
            FROM apps
            WHERE teams && $1
            ORDER BY name
            "#,
        )
        .bind(teams)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to list apps: {}", e)))?;

        let names: Vec<String> = rows.iter().map(|row| row.get("name")).collect();
        let mut logs = self.logs_of(&names).await?;

        rows.into_iter()
            .map(|row| {
                let name: String = row.get("name");
                Self::decode(row.get("document"), logs.remove(&name).unwrap_or_default())
            })
            .collect()
    }

    async fn remove(&self, name: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM apps WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to remove app: {}", e)))?;
        Ok(())
    }

    async fn append_logs(&self, name: &str, mut entries: Vec<LogEntry>) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query("SELECT name FROM apps WHERE name = $1 FOR UPDATE")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(RepositoryError::NotFound(name.to_string()));
        }

        let last: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(date) FROM app_logs WHERE app_name = $1")
                .bind(name)
                .fetch_one(&mut *tx)
                .await?;
        clamp_dates(last, &mut entries);

        for entry in &entries {
            sqlx::query(
                r#"
                INSERT INTO app_logs (app_name, date, message, source)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(name)
            .bind(entry.date)
            .bind(&entry.message)
            .bind(&entry.source)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to append log: {}", e)))?;
        }

        tx.commit().await?;
        Ok(())
    }
}
