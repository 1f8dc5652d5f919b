// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Binding Orchestrator
//!
//! Binds apps to service instances. Binding asks the service backend for
//! credentials and folds them into the app environment as private variables
//! tagged with the instance name; unbinding removes exactly those variables
//! and tells the backend to release the resource.
//!
//! The release notification runs as a detached task after the unbind has
//! been persisted. It retries on a fixed interval until it succeeds or the
//! overall timeout elapses, and its outcome never reaches the caller.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::access::AccessGuard;
use crate::application::environment::EnvironmentManager;
use crate::application::registry::{AppRegistry, NamedLocks};
use crate::domain::app::{is_valid_env_name, App, EnvVar};
use crate::domain::catalog::{CatalogError, ServiceCatalog};
use crate::domain::error::{
    PlatformError, ALREADY_BOUND, BINDING_APP_ACCESS_DENIED, INSTANCE_ACCESS_DENIED,
    INSTANCE_NOT_FOUND, NOT_BOUND,
};
use crate::domain::repository::{ServiceInstanceRepository, ServiceRepository};
use crate::domain::service::{Service, ServiceInstance};
use crate::domain::team::User;

#[async_trait]
pub trait BindingService: Send + Sync {
    /// Bind `app` to `instance`, returning the injected variable names
    async fn bind(&self, user: &User, instance: &str, app: &str) -> Result<Vec<String>, PlatformError>;

    async fn unbind(&self, user: &User, instance: &str, app: &str) -> Result<(), PlatformError>;
}

/// Retry policy of the detached release notification
#[derive(Debug, Clone, Copy)]
pub struct ReleasePolicy {
    pub retry_interval: Duration,
    pub timeout: Duration,
}

impl Default for ReleasePolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct StandardBindingService {
    registry: AppRegistry,
    guard: AccessGuard,
    environment: Arc<EnvironmentManager>,
    services: Arc<dyn ServiceRepository>,
    instances: Arc<dyn ServiceInstanceRepository>,
    catalog: Arc<dyn ServiceCatalog>,
    instance_locks: NamedLocks,
    release_policy: ReleasePolicy,
}

impl StandardBindingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: AppRegistry,
        guard: AccessGuard,
        environment: Arc<EnvironmentManager>,
        services: Arc<dyn ServiceRepository>,
        instances: Arc<dyn ServiceInstanceRepository>,
        catalog: Arc<dyn ServiceCatalog>,
        release_policy: ReleasePolicy,
    ) -> Self {
        Self {
            registry,
            guard,
            environment,
            services,
            instances,
            catalog,
            instance_locks: NamedLocks::new(),
            release_policy,
        }
    }

    /// Instance, instance access, app, app access: checked in that order
    async fn load(
        &self,
        user: &User,
        instance: &str,
        app: &str,
    ) -> Result<(ServiceInstance, App), PlatformError> {
        let instance = self
            .instances
            .find_by_name(instance)
            .await?
            .ok_or_else(|| PlatformError::NotFound(INSTANCE_NOT_FOUND.to_string()))?;

        let teams = self.guard.teams_of(user).await?;
        if !instance.is_accessible_by(user, &teams) {
            return Err(PlatformError::Forbidden(INSTANCE_ACCESS_DENIED.to_string()));
        }

        let app = self.registry.find(app).await?;
        if !app.is_accessible_by(user, &teams) {
            return Err(PlatformError::Forbidden(BINDING_APP_ACCESS_DENIED.to_string()));
        }

        Ok((instance, app))
    }

    async fn service_of(&self, instance: &ServiceInstance) -> Result<Service, PlatformError> {
        self.services
            .find_by_name(&instance.service_name)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("Service {} not found", instance.service_name)))
    }

    /// Apply `change` to the stored instance under its lock
    async fn update_instance<F>(&self, name: &str, change: F) -> Result<ServiceInstance, PlatformError>
    where
        F: FnOnce(&mut ServiceInstance) -> Result<(), PlatformError>,
    {
        let _guard = self.instance_locks.acquire(name).await;
        let mut instance = self
            .instances
            .find_by_name(name)
            .await?
            .ok_or_else(|| PlatformError::NotFound(INSTANCE_NOT_FOUND.to_string()))?;
        change(&mut instance)?;
        self.instances.save(&instance).await?;
        Ok(instance)
    }
}

#[async_trait]
impl BindingService for StandardBindingService {
    async fn bind(&self, user: &User, instance: &str, app: &str) -> Result<Vec<String>, PlatformError> {
        let (instance, app) = self.load(user, instance, app).await?;
        if instance.is_bound_to(&app.name) {
            return Err(PlatformError::Conflict(ALREADY_BOUND.to_string()));
        }
        let service = self.service_of(&instance).await?;

        let credentials = self
            .catalog
            .request_credentials(&service, &instance, app.host_identifier())
            .await?;
        if let Some(name) = credentials.keys().find(|name| !is_valid_env_name(name)) {
            warn!(instance = %instance.name, name = ?name, "Service returned an invalid variable name");
            return Err(CatalogError::InvalidResponse(format!("invalid variable name {:?}", name)).into());
        }

        let vars: Vec<EnvVar> = credentials
            .into_iter()
            .map(|(name, value)| EnvVar::from_instance(name, value, instance.name.clone()))
            .collect();
        let names: Vec<String> = vars.iter().map(|v| v.name.clone()).collect();

        let (app, previous) = self
            .registry
            .modify(&app.name, move |app| {
                let previous: Vec<(String, Option<EnvVar>)> = vars
                    .iter()
                    .map(|v| (v.name.clone(), app.env.get(&v.name).cloned()))
                    .collect();
                app.set_env(vars, false);
                Ok(previous)
            })
            .await?;
        let app_name = app.name.clone();
        if let Err(e) = self
            .update_instance(&instance.name, |i| i.add_app(&app_name))
            .await
        {
            warn!(app = %app.name, instance = %instance.name, error = %e, "Instance update failed, reverting env");
            self.registry
                .modify(&app.name, move |app| {
                    for (name, var) in previous {
                        match var {
                            Some(var) => {
                                app.env.insert(name, var);
                            }
                            None => {
                                app.env.remove(&name);
                            }
                        }
                    }
                    Ok(())
                })
                .await?;
            return Err(e);
        }
        info!(app = %app.name, instance = %instance.name, vars = ?names, "App bound to service instance");

        self.environment.push(&app).await?;
        Ok(names)
    }

    async fn unbind(&self, user: &User, instance: &str, app: &str) -> Result<(), PlatformError> {
        let (instance, app) = self.load(user, instance, app).await?;
        if !instance.is_bound_to(&app.name) {
            return Err(PlatformError::PreconditionFailed(NOT_BOUND.to_string()));
        }
        let service = self.service_of(&instance).await?;

        let instance_name = instance.name.clone();
        let (app, removed) = self
            .registry
            .modify(&app.name, move |app| Ok(app.remove_instance_env(&instance_name)))
            .await?;
        let app_name = app.name.clone();
        let instance = self
            .update_instance(&instance.name, |i| i.remove_app(&app_name))
            .await?;
        info!(app = %app.name, instance = %instance.name, vars = ?removed, "App unbound from service instance");

        spawn_release(
            self.catalog.clone(),
            service,
            instance,
            app.host_identifier().to_string(),
            self.release_policy,
        );

        self.environment.push(&app).await
    }
}

/// Notify the backend that `app_host` no longer uses `instance`.
///
/// Retries every `policy.retry_interval` until success or `policy.timeout`.
pub fn spawn_release(
    catalog: Arc<dyn ServiceCatalog>,
    service: Service,
    instance: ServiceInstance,
    app_host: String,
    policy: ReleasePolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let attempts = async {
            let mut attempt: u32 = 0;
            loop {
                attempt += 1;
                match catalog.release_resource(&service, &instance, &app_host).await {
                    Ok(()) => return attempt,
                    Err(e) => {
                        debug!(
                            instance = %instance.name,
                            attempt,
                            error = %e,
                            "Resource release failed, retrying"
                        );
                        tokio::time::sleep(policy.retry_interval).await;
                    }
                }
            }
        };

        match tokio::time::timeout(policy.timeout, attempts).await {
            Ok(attempt) => {
                metrics::counter!("stevedore_binding_releases_total", "outcome" => "released").increment(1);
                info!(instance = %instance.name, host = %app_host, attempt, "Service resource released");
            }
            Err(_) => {
                metrics::counter!("stevedore_binding_releases_total", "outcome" => "abandoned").increment(1);
                warn!(
                    instance = %instance.name,
                    host = %app_host,
                    timeout_secs = policy.timeout.as_secs(),
                    "Giving up releasing service resource"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatcher::RemoteCommandDispatcher;
    use crate::domain::app::{unit_state, Unit};
    use crate::domain::platform_config::DeployConfig;
    use crate::domain::repository::{RepositoryError, TeamRepository};
    use crate::domain::team::Team;
    use crate::infrastructure::fakes::{FakeServiceCatalog, RecordingProvisioner};
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::infrastructure::repositories::{
        InMemoryAppRepository, InMemoryServiceInstanceRepository, InMemoryServiceRepository,
        InMemoryTeamRepository,
    };

    struct Fixture {
        bindings: StandardBindingService,
        registry: AppRegistry,
        instances: Arc<InMemoryServiceInstanceRepository>,
        catalog: Arc<FakeServiceCatalog>,
        provisioner: Arc<RecordingProvisioner>,
        fail_instance_saves: Arc<AtomicBool>,
        user: User,
    }

    /// Instance store whose saves can be switched to fail
    struct SwitchableInstances {
        inner: Arc<InMemoryServiceInstanceRepository>,
        fail_saves: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ServiceInstanceRepository for SwitchableInstances {
        async fn save(&self, instance: &ServiceInstance) -> Result<(), RepositoryError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(RepositoryError::Database("connection reset".into()));
            }
            self.inner.save(instance).await
        }

        async fn find_by_name(&self, name: &str) -> Result<Option<ServiceInstance>, RepositoryError> {
            self.inner.find_by_name(name).await
        }
    }

    fn fast_policy() -> ReleasePolicy {
        ReleasePolicy {
            retry_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(2),
        }
    }

    async fn fixture(policy: ReleasePolicy) -> Fixture {
        fixture_with_catalog(
            policy,
            FakeServiceCatalog::with_credentials([
                ("DATABASE_USER", "root"),
                ("DATABASE_PASSWORD", "s3cr3t"),
            ]),
        )
        .await
    }

    async fn fixture_with_catalog(policy: ReleasePolicy, catalog: FakeServiceCatalog) -> Fixture {
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

        let mut app = App::new("painkiller", "python").unwrap();
        app.teams.push("tsuruteam".into());
        app.units.push(Unit {
            ip: "10.10.10.10".into(),
            agent_state: unit_state::STARTED.into(),
            machine_agent_state: unit_state::RUNNING.into(),
            instance_state: unit_state::RUNNING.into(),
            ..Unit::new("painkiller/0", "python", 1)
        });
        app.set_env(vec![EnvVar::public("DATABASE_HOST", "arrea")], false);
        registry.insert(&app).await.unwrap();

        let services = Arc::new(InMemoryServiceRepository::new());
        services
            .save(&Service {
                name: "mysql".into(),
                endpoint: "http://mysql.api".into(),
            })
            .await
            .unwrap();
        let instances = Arc::new(InMemoryServiceInstanceRepository::new());
        let mut instance = ServiceInstance::new("my-mysql", "mysql");
        instance.teams.push("tsuruteam".into());
        instances.save(&instance).await.unwrap();
        let mut private = ServiceInstance::new("their-mysql", "mysql");
        private.teams.push("outsiders".into());
        instances.save(&private).await.unwrap();

        let catalog = Arc::new(catalog);
        let fail_instance_saves = Arc::new(AtomicBool::new(false));
        let provisioner = Arc::new(RecordingProvisioner::new());
        let dispatcher = Arc::new(RemoteCommandDispatcher::new(provisioner.clone(), DeployConfig::default()));
        let guard = AccessGuard::new(registry.clone(), teams);
        let environment = Arc::new(EnvironmentManager::new(
            registry.clone(),
            guard.clone(),
            dispatcher,
            DeployConfig::default(),
        ));

        Fixture {
            bindings: StandardBindingService::new(
                registry.clone(),
                guard,
                environment,
                services,
                Arc::new(SwitchableInstances {
                    inner: instances.clone(),
                    fail_saves: fail_instance_saves.clone(),
                }),
                catalog.clone(),
                policy,
            ),
            registry,
            instances,
            catalog,
            provisioner,
            fail_instance_saves,
            user: User::new("cidade@eu.com"),
        }
    }

    #[tokio::test]
    async fn test_bind_injects_private_tagged_vars() {
        let f = fixture(fast_policy()).await;

        let names = f.bindings.bind(&f.user, "my-mysql", "painkiller").await.unwrap();
        assert_eq!(names, vec!["DATABASE_PASSWORD", "DATABASE_USER"]);

        let app = f.registry.find("painkiller").await.unwrap();
        for name in &names {
            let var = &app.env[name];
            assert!(!var.public);
            assert_eq!(var.instance_name, "my-mysql");
        }
        assert_eq!(app.env["DATABASE_PASSWORD"].value, "s3cr3t");

        let instance = f.instances.find_by_name("my-mysql").await.unwrap().unwrap();
        assert_eq!(instance.apps, vec!["painkiller"]);
        assert_eq!(f.catalog.requests(), vec![("my-mysql".to_string(), "10.10.10.10".to_string())]);

        let executed = f.provisioner.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].1.contains("export DATABASE_PASSWORD=\"s3cr3t\""));
    }

    #[tokio::test]
    async fn test_bind_check_order() {
        let f = fixture(fast_policy()).await;

        let err = f.bindings.bind(&f.user, "ghost", "nowhere").await.unwrap_err();
        assert_eq!(err, PlatformError::NotFound(INSTANCE_NOT_FOUND.to_string()));

        let err = f.bindings.bind(&f.user, "their-mysql", "nowhere").await.unwrap_err();
        assert_eq!(err, PlatformError::Forbidden(INSTANCE_ACCESS_DENIED.to_string()));

        let err = f.bindings.bind(&f.user, "my-mysql", "nowhere").await.unwrap_err();
        assert_eq!(err, PlatformError::app_not_found("nowhere"));

        let mut foreign = App::new("foreign", "python").unwrap();
        foreign.teams.push("outsiders".into());
        f.registry.insert(&foreign).await.unwrap();
        let err = f.bindings.bind(&f.user, "my-mysql", "foreign").await.unwrap_err();
        assert_eq!(err, PlatformError::Forbidden(BINDING_APP_ACCESS_DENIED.to_string()));

        assert!(f.catalog.requests().is_empty());
    }

    #[tokio::test]
    async fn test_bind_twice_is_a_conflict() {
        let f = fixture(fast_policy()).await;
        f.bindings.bind(&f.user, "my-mysql", "painkiller").await.unwrap();
        let err = f.bindings.bind(&f.user, "my-mysql", "painkiller").await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_credential_names() {
        let f = fixture_with_catalog(
            fast_policy(),
            FakeServiceCatalog::with_credentials([
                ("DATABASE_USER", "root"),
                ("X\nEND\ntouch /tmp/owned\n#", "v"),
            ]),
        )
        .await;

        let err = f.bindings.bind(&f.user, "my-mysql", "painkiller").await.unwrap_err();
        assert_eq!(err.status_code(), 502);

        let app = f.registry.find("painkiller").await.unwrap();
        assert_eq!(app.env.keys().collect::<Vec<_>>(), vec!["DATABASE_HOST"]);
        let instance = f.instances.find_by_name("my-mysql").await.unwrap().unwrap();
        assert!(instance.apps.is_empty());
        assert!(f.provisioner.executed().is_empty());

        let f = fixture_with_catalog(
            fast_policy(),
            FakeServiceCatalog::with_credentials([("bad-name", "v")]),
        )
        .await;
        let err = f.bindings.bind(&f.user, "my-mysql", "painkiller").await.unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert_eq!(f.registry.find("painkiller").await.unwrap().env.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_instance_save_reverts_env() {
        let f = fixture_with_catalog(
            fast_policy(),
            FakeServiceCatalog::with_credentials([
                ("DATABASE_HOST", "mysql.internal"),
                ("DATABASE_PASSWORD", "s3cr3t"),
            ]),
        )
        .await;
        f.fail_instance_saves.store(true, Ordering::SeqCst);

        let err = f.bindings.bind(&f.user, "my-mysql", "painkiller").await.unwrap_err();
        assert_eq!(err.status_code(), 500);

        let app = f.registry.find("painkiller").await.unwrap();
        assert_eq!(app.env.len(), 1);
        assert_eq!(app.env["DATABASE_HOST"], EnvVar::public("DATABASE_HOST", "arrea"));
        assert!(f.provisioner.executed().is_empty());

        f.fail_instance_saves.store(false, Ordering::SeqCst);
        f.bindings.bind(&f.user, "my-mysql", "painkiller").await.unwrap();
    }

    #[tokio::test]
    async fn test_catalog_failure_leaves_no_trace() {
        let f = fixture(fast_policy()).await;
        f.catalog.fail_requests("mysql is down");

        let err = f.bindings.bind(&f.user, "my-mysql", "painkiller").await.unwrap_err();
        assert_eq!(err, PlatformError::Upstream("mysql is down".to_string()));

        let instance = f.instances.find_by_name("my-mysql").await.unwrap().unwrap();
        assert!(instance.apps.is_empty());
        assert_eq!(f.registry.find("painkiller").await.unwrap().env.len(), 1);
    }

    #[tokio::test]
    async fn test_unbind_removes_only_instance_vars_and_releases() {
        let f = fixture(fast_policy()).await;
        f.bindings.bind(&f.user, "my-mysql", "painkiller").await.unwrap();
        let before = f.registry.find("painkiller").await.unwrap().env["DATABASE_HOST"].clone();

        f.bindings.unbind(&f.user, "my-mysql", "painkiller").await.unwrap();

        let app = f.registry.find("painkiller").await.unwrap();
        assert_eq!(app.env.len(), 1);
        assert_eq!(app.env["DATABASE_HOST"], before);
        let instance = f.instances.find_by_name("my-mysql").await.unwrap().unwrap();
        assert!(instance.apps.is_empty());

        assert!(f.catalog.wait_for_release(Duration::from_secs(1)).await);
        assert_eq!(
            f.catalog.releases(),
            vec![("my-mysql".to_string(), "10.10.10.10".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unbind_not_bound_is_rejected() {
        let f = fixture(fast_policy()).await;
        let err = f.bindings.unbind(&f.user, "my-mysql", "painkiller").await.unwrap_err();
        assert_eq!(err.status_code(), 412);
    }

    #[tokio::test]
    async fn test_release_is_retried_until_it_succeeds() {
        let f = fixture(fast_policy()).await;
        f.bindings.bind(&f.user, "my-mysql", "painkiller").await.unwrap();
        f.catalog.fail_releases(3);

        f.bindings.unbind(&f.user, "my-mysql", "painkiller").await.unwrap();

        assert!(f.catalog.wait_for_release(Duration::from_secs(1)).await);
        assert_eq!(f.catalog.release_attempts(), 4);
    }

    #[tokio::test]
    async fn test_release_gives_up_after_timeout() {
        let catalog: Arc<FakeServiceCatalog> = Arc::new(FakeServiceCatalog::new());
        catalog.fail_releases(usize::MAX);
        let policy = ReleasePolicy {
            retry_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(50),
        };

        let handle = spawn_release(
            catalog.clone(),
            Service {
                name: "mysql".into(),
                endpoint: "http://mysql.api".into(),
            },
            ServiceInstance::new("my-mysql", "mysql"),
            "10.10.10.10".into(),
            policy,
        );
        handle.await.unwrap();

        assert!(catalog.releases().is_empty());
        assert!(catalog.release_attempts() >= 2);
    }
}
