// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository selection and bootstrap seeding

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use stevedore_core::domain::platform_config::{BootstrapConfig, ControlPlaneManifest};
use stevedore_core::domain::repository::{
    AppRepository, ServiceInstanceRepository, ServiceRepository, StorageBackend, TeamRepository,
};
use stevedore_core::domain::service::{Service, ServiceInstance};
use stevedore_core::domain::team::Team;
use stevedore_core::infrastructure::db::Database;
use stevedore_core::infrastructure::repositories::{
    InMemoryAppRepository, InMemoryServiceInstanceRepository, InMemoryServiceRepository,
    InMemoryTeamRepository, PostgresAppRepository, PostgresServiceInstanceRepository,
    PostgresServiceRepository, PostgresTeamRepository,
};

pub struct Repositories {
    pub apps: Arc<dyn AppRepository>,
    pub teams: Arc<dyn TeamRepository>,
    pub services: Arc<dyn ServiceRepository>,
    pub instances: Arc<dyn ServiceInstanceRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            apps: Arc::new(InMemoryAppRepository::new()),
            teams: Arc::new(InMemoryTeamRepository::new()),
            services: Arc::new(InMemoryServiceRepository::new()),
            instances: Arc::new(InMemoryServiceInstanceRepository::new()),
        }
    }

    /// Open the backend selected by the configuration, migrating PostgreSQL
    pub async fn open(config: &ControlPlaneManifest) -> Result<Self> {
        match config.storage_backend() {
            StorageBackend::InMemory => {
                warn!("No database configured, using in-memory repositories; state is lost on restart");
                Ok(Self::in_memory())
            }
            StorageBackend::PostgreSQL(pg) => {
                let db = Database::new(&pg.connection_string, config.spec.database.max_connections)
                    .await?;
                db.migrate().await?;
                info!("Using PostgreSQL repositories");

                let pool = db.get_pool().clone();
                Ok(Self {
                    apps: Arc::new(PostgresAppRepository::new(pool.clone())),
                    teams: Arc::new(PostgresTeamRepository::new(pool.clone())),
                    services: Arc::new(PostgresServiceRepository::new(pool.clone())),
                    instances: Arc::new(PostgresServiceInstanceRepository::new(pool)),
                })
            }
        }
    }

    /// Upsert the configured teams, services and instances
    pub async fn seed(&self, bootstrap: &BootstrapConfig) -> Result<()> {
        for team in &bootstrap.teams {
            self.teams
                .save(&Team::new(team.name.clone(), team.users.clone()))
                .await
                .with_context(|| format!("Failed to seed team {}", team.name))?;
        }

        for service in &bootstrap.services {
            self.services
                .save(&Service {
                    name: service.name.clone(),
                    endpoint: service.endpoint.clone(),
                })
                .await
                .with_context(|| format!("Failed to seed service {}", service.name))?;

            for bootstrap_instance in &service.instances {
                // Keep bindings recorded by an earlier run
                let mut instance = self
                    .instances
                    .find_by_name(&bootstrap_instance.name)
                    .await?
                    .unwrap_or_else(|| {
                        ServiceInstance::new(bootstrap_instance.name.clone(), service.name.clone())
                    });
                instance.service_name = service.name.clone();
                instance.teams = bootstrap_instance.teams.clone();
                self.instances
                    .save(&instance)
                    .await
                    .with_context(|| format!("Failed to seed instance {}", instance.name))?;
            }
        }

        if !bootstrap.is_empty() {
            info!(
                teams = bootstrap.teams.len(),
                services = bootstrap.services.len(),
                "Bootstrap data seeded"
            );
        }
        Ok(())
    }
}
