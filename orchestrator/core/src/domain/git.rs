// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Repository Host Interface
//!
//! Every app gets a git repository on the repository host. The control plane
//! creates and removes it and keeps its access list in sync with the app's
//! teams. Non-2xx answers surface as [`GitServerError::Rejected`] carrying the
//! host's own reason.

use async_trait::async_trait;
use thiserror::Error;

#[async_trait]
pub trait GitServer: Send + Sync {
    async fn create_repository(&self, name: &str, users: &[String]) -> Result<(), GitServerError>;

    async fn grant_access(&self, repositories: &[String], users: &[String]) -> Result<(), GitServerError>;

    async fn revoke_access(&self, repositories: &[String], users: &[String]) -> Result<(), GitServerError>;

    async fn remove_repository(&self, name: &str) -> Result<(), GitServerError>;

    /// Read-only URL units clone from
    fn clone_url(&self, name: &str) -> String;

    /// URL developers push to
    fn repository_url(&self, name: &str) -> String;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitServerError {
    #[error("repository host request failed: {0}")]
    Request(String),

    #[error("repository host answered {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl GitServerError {
    /// Reason reported by the host, verbatim when it gave one
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected { message, .. } if !message.trim().is_empty() => message.trim().to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for GitServerError {
    fn from(err: reqwest::Error) -> Self {
        GitServerError::Request(err.to_string())
    }
}
