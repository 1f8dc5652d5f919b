// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP service catalog
//!
//! Each service exposes a provisioning API at its own endpoint:
//!
//! - `POST <endpoint>/resources/<instance>` with form field `hostname`
//!   answers a JSON object of credentials
//! - `DELETE <endpoint>/resources/<instance>/hostname/<host>` releases them

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::domain::catalog::{CatalogError, ServiceCatalog};
use crate::domain::service::{Service, ServiceInstance};

pub struct HttpServiceCatalog {
    client: Client,
}

impl HttpServiceCatalog {
    pub fn new(timeout: Duration) -> Result<Self, CatalogError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn build_url(service: &Service, path: &str) -> String {
        format!("{}{}", service.endpoint.trim_end_matches('/'), path)
    }

    async fn rejection(response: reqwest::Response) -> CatalogError {
        let status = response.status();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| format!("HTTP {}", status));
        CatalogError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl ServiceCatalog for HttpServiceCatalog {
    async fn request_credentials(
        &self,
        service: &Service,
        instance: &ServiceInstance,
        app_host: &str,
    ) -> Result<BTreeMap<String, String>, CatalogError> {
        let url = Self::build_url(service, &format!("/resources/{}", instance.name));
        debug!(service = %service.name, instance = %instance.name, "Requesting credentials");

        let response = self
            .client
            .post(&url)
            .form(&[("hostname", app_host)])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
            _ => Err(Self::rejection(response).await),
        }
    }

    async fn release_resource(
        &self,
        service: &Service,
        instance: &ServiceInstance,
        app_host: &str,
    ) -> Result<(), CatalogError> {
        let url = Self::build_url(
            service,
            &format!("/resources/{}/hostname/{}", instance.name, app_host),
        );
        let response = self.client.delete(&url).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::rejection(response).await)
        }
    }
}
