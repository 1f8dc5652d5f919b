// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Service Catalog Interface
//!
//! Service backends hand out credentials when an app binds to one of their
//! instances and reclaim them when it unbinds. The app is identified towards
//! the backend by its host identifier (see `App::host_identifier`).

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::service::{Service, ServiceInstance};

#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// Ask the backend for the variables the app needs to reach `instance`
    async fn request_credentials(
        &self,
        service: &Service,
        instance: &ServiceInstance,
        app_host: &str,
    ) -> Result<BTreeMap<String, String>, CatalogError>;

    /// Tell the backend the app no longer uses `instance`
    async fn release_resource(
        &self,
        service: &Service,
        instance: &ServiceInstance,
        app_host: &str,
    ) -> Result<(), CatalogError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("service request failed: {0}")]
    Request(String),

    #[error("service answered {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid service response: {0}")]
    InvalidResponse(String),
}

impl CatalogError {
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected { message, .. } if !message.trim().is_empty() => message.trim().to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CatalogError::InvalidResponse(err.to_string())
        } else {
            CatalogError::Request(err.to_string())
        }
    }
}
