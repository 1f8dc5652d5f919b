// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Gandalf repository host adapter
//!
//! Talks to a Gandalf-compatible HTTP API to create, share and remove the git
//! repositories apps are pushed to.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::domain::git::{GitServer, GitServerError};
use crate::domain::platform_config::GitConfig;

#[derive(Serialize)]
struct NewRepository<'a> {
    name: &'a str,
    users: &'a [String],
    ispublic: bool,
}

#[derive(Serialize)]
struct AccessChange<'a> {
    repositories: &'a [String],
    users: &'a [String],
}

pub struct GandalfClient {
    client: Client,

    /// API base URL (e.g., "http://localhost:8000")
    server: String,

    /// Hostname used in clone and push URLs
    host: String,
}

impl GandalfClient {
    pub fn new(config: &GitConfig) -> Result<Self, GitServerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            server: config.server.trim_end_matches('/').to_string(),
            host: config.host.clone(),
        })
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    async fn check(response: reqwest::Response) -> Result<(), GitServerError> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => Ok(()),
            status => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("HTTP {}", status));
                Err(GitServerError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl GitServer for GandalfClient {
    async fn create_repository(&self, name: &str, users: &[String]) -> Result<(), GitServerError> {
        debug!(repository = %name, "Creating repository");
        let response = self
            .client
            .post(self.build_url("/repository"))
            .json(&NewRepository {
                name,
                users,
                ispublic: false,
            })
            .send()
            .await?;
        Self::check(response).await
    }

    async fn grant_access(&self, repositories: &[String], users: &[String]) -> Result<(), GitServerError> {
        let response = self
            .client
            .post(self.build_url("/repository/grant"))
            .json(&AccessChange { repositories, users })
            .send()
            .await?;
        Self::check(response).await
    }

    async fn revoke_access(&self, repositories: &[String], users: &[String]) -> Result<(), GitServerError> {
        let response = self
            .client
            .delete(self.build_url("/repository/revoke"))
            .json(&AccessChange { repositories, users })
            .send()
            .await?;
        Self::check(response).await
    }

    async fn remove_repository(&self, name: &str) -> Result<(), GitServerError> {
        debug!(repository = %name, "Removing repository");
        let response = self
            .client
            .delete(self.build_url(&format!("/repository/{}", name)))
            .send()
            .await?;
        Self::check(response).await
    }

    fn clone_url(&self, name: &str) -> String {
        format!("git://{}/{}.git", self.host, name)
    }

    fn repository_url(&self, name: &str) -> String {
        format!("git@{}:{}.git", self.host, name)
    }
}
