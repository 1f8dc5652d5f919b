// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP server for the control plane
//!
//! Wires repositories and remote collaborators into the application services
//! and serves the API until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use stevedore_core::application::{Collaborators, ControlPlane, ReleasePolicy};
use stevedore_core::domain::platform_config::{ControlPlaneManifest, MetricsConfig};
use stevedore_core::infrastructure::{GandalfClient, HttpServiceCatalog, JujuProvisioner};
use stevedore_core::presentation::api::{self, AppState};

use super::bootstrap::Repositories;

/// Listener overrides taken from the command line
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
}

pub async fn start_server(config: ControlPlaneManifest, options: ServeOptions) -> Result<()> {
    config
        .validate()
        .context("Configuration validation failed")?;

    info!(
        "Stevedore control plane starting: name={}, pid={}",
        config.metadata.name,
        std::process::id()
    );

    let spec = &config.spec;

    let repositories = Repositories::open(&config).await?;
    repositories.seed(&spec.bootstrap).await?;

    let git = GandalfClient::new(&spec.git).context("Failed to build repository host client")?;
    let catalog = HttpServiceCatalog::new(spec.services.request_timeout())
        .context("Failed to build service catalog client")?;

    let plane = ControlPlane::new(
        Collaborators {
            apps: repositories.apps,
            teams: repositories.teams,
            services: repositories.services,
            instances: repositories.instances,
            provisioner: Arc::new(JujuProvisioner::new(&spec.provisioner, &spec.deploy)),
            git: Arc::new(git),
            catalog: Arc::new(catalog),
        },
        spec.deploy.clone(),
        ReleasePolicy {
            retry_interval: spec.services.release_retry_interval(),
            timeout: spec.services.release_timeout(),
        },
    );

    let host = options.host.unwrap_or_else(|| spec.api.bind_address.clone());
    let port = options.port.unwrap_or(spec.api.port);

    if spec.observability.metrics.enabled {
        install_metrics_exporter(&host, &spec.observability.metrics)?;
    }

    let app = api::app(AppState::from(plane));

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Control plane listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Control plane shut down");
    Ok(())
}

fn install_metrics_exporter(host: &str, metrics: &MetricsConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, metrics.port)
        .parse()
        .with_context(|| format!("Invalid metrics listen address {}:{}", host, metrics.port))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Prometheus metrics exposed on {}", addr);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
