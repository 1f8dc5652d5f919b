// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service catalog entries and the instances apps bind to.

use serde::{Deserialize, Serialize};

use crate::domain::error::{PlatformError, ALREADY_BOUND, NOT_BOUND};
use crate::domain::team::{Team, User};

/// A backing service offered by the catalog (mysql, redis, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Base URL of the service's provisioning API
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub name: String,
    pub service_name: String,
    #[serde(default)]
    pub teams: Vec<String>,
    /// Names of the apps currently bound to this instance
    #[serde(default)]
    pub apps: Vec<String>,
}

impl ServiceInstance {
    pub fn new(name: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service_name: service_name.into(),
            teams: Vec::new(),
            apps: Vec::new(),
        }
    }

    pub fn is_accessible_by(&self, user: &User, teams: &[Team]) -> bool {
        teams.iter().any(|team| {
            self.teams.iter().any(|t| t == &team.name) && team.contains_user(&user.email)
        })
    }

    pub fn is_bound_to(&self, app: &str) -> bool {
        self.apps.iter().any(|a| a == app)
    }

    pub fn add_app(&mut self, app: &str) -> Result<(), PlatformError> {
        if self.is_bound_to(app) {
            return Err(PlatformError::Conflict(ALREADY_BOUND.to_string()));
        }
        self.apps.push(app.to_string());
        Ok(())
    }

    pub fn remove_app(&mut self, app: &str) -> Result<(), PlatformError> {
        let Some(index) = self.apps.iter().position(|a| a == app) else {
            return Err(PlatformError::PreconditionFailed(NOT_BOUND.to_string()));
        };
        self.apps.remove(index);
        Ok(())
    }
}
