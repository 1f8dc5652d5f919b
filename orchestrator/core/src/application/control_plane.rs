// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service wiring
//!
//! Builds every application service from the repositories and remote
//! collaborators, sharing one registry (and therefore one set of per-app
//! locks) between them.

use std::sync::Arc;

use crate::application::access::AccessGuard;
use crate::application::app_service::{AppService, StandardAppService};
use crate::application::binding::{BindingService, ReleasePolicy, StandardBindingService};
use crate::application::deploy::{DeploymentPipeline, DeploymentService};
use crate::application::dispatcher::{CommandDispatcher, RemoteCommandDispatcher};
use crate::application::environment::{EnvironmentManager, EnvironmentService};
use crate::application::logs::{LogService, StandardLogService};
use crate::application::registry::AppRegistry;
use crate::domain::catalog::ServiceCatalog;
use crate::domain::git::GitServer;
use crate::domain::platform_config::DeployConfig;
use crate::domain::provisioner::Provisioner;
use crate::domain::repository::{
    AppRepository, ServiceInstanceRepository, ServiceRepository, TeamRepository,
};

pub struct Collaborators {
    pub apps: Arc<dyn AppRepository>,
    pub teams: Arc<dyn TeamRepository>,
    pub services: Arc<dyn ServiceRepository>,
    pub instances: Arc<dyn ServiceInstanceRepository>,
    pub provisioner: Arc<dyn Provisioner>,
    pub git: Arc<dyn GitServer>,
    pub catalog: Arc<dyn ServiceCatalog>,
}

pub struct ControlPlane {
    pub apps: Arc<dyn AppService>,
    pub environment: Arc<dyn EnvironmentService>,
    pub deployments: Arc<dyn DeploymentService>,
    pub logs: Arc<dyn LogService>,
    pub bindings: Arc<dyn BindingService>,
}

impl ControlPlane {
    pub fn new(collaborators: Collaborators, deploy: DeployConfig, release_policy: ReleasePolicy) -> Self {
        let Collaborators {
            apps,
            teams,
            services,
            instances,
            provisioner,
            git,
            catalog,
        } = collaborators;

        let registry = AppRegistry::new(apps);
        let guard = AccessGuard::new(registry.clone(), teams.clone());
        let dispatcher: Arc<dyn CommandDispatcher> =
            Arc::new(RemoteCommandDispatcher::new(provisioner.clone(), deploy.clone()));
        let environment = Arc::new(EnvironmentManager::new(
            registry.clone(),
            guard.clone(),
            dispatcher.clone(),
            deploy.clone(),
        ));

        Self {
            apps: Arc::new(StandardAppService::new(
                registry.clone(),
                guard.clone(),
                teams,
                provisioner.clone(),
                git.clone(),
                dispatcher.clone(),
            )),
            deployments: Arc::new(DeploymentPipeline::new(
                registry.clone(),
                guard.clone(),
                dispatcher,
                provisioner,
                git,
                deploy,
            )),
            logs: Arc::new(StandardLogService::new(registry.clone(), guard.clone())),
            bindings: Arc::new(StandardBindingService::new(
                registry,
                guard,
                environment.clone(),
                services,
                instances,
                catalog,
                release_policy,
            )),
            environment,
        }
    }
}
