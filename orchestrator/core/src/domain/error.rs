// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Platform Errors
//!
//! Every application service in the control plane fails with a
//! [`PlatformError`]: a tagged kind carrying an HTTP-style status code and a
//! stable, user-facing message. Collaborator errors (persistence, provisioner,
//! repository host, service catalog) convert into it through `From` impls so
//! services can propagate them with `?`.
//!
//! | Kind | Status |
//! |------|--------|
//! | `NotFound` | 404 |
//! | `Forbidden` | 403 |
//! | `Conflict` | 409 |
//! | `PreconditionFailed` | 412 |
//! | `BadRequest` | 400 |
//! | `Upstream` | 502 |
//! | `Internal` | 500 |

use thiserror::Error;

use crate::domain::catalog::CatalogError;
use crate::domain::git::GitServerError;
use crate::domain::hooks::ManifestError;
use crate::domain::provisioner::ProvisionerError;
use crate::domain::repository::RepositoryError;

pub const APP_ACCESS_DENIED: &str = "User does not have access to this app";
pub const BINDING_APP_ACCESS_DENIED: &str = "This user does not have access to this app";
pub const INSTANCE_ACCESS_DENIED: &str = "This user does not have access to this instance";
pub const INSTANCE_NOT_FOUND: &str = "Instance not found";
pub const TEAM_NOT_FOUND: &str = "Team not found";
pub const TEAM_ALREADY_GRANTED: &str = "This team has already access to this app";
pub const TEAM_WITHOUT_ACCESS: &str = "This team does not have access to this app";
pub const LAST_TEAM_REVOKE: &str = "You can not revoke the access from this team, because it is the unique team with access to the app, and an app can not be orphaned";
pub const NO_TEAM_ON_CREATE: &str = "In order to create an app, you should be member of at least one team";
pub const INVALID_APP_NAME: &str = "Invalid app name, your app should have at most 63 characters, containing only lower case letters, numbers, underscores (_) or dashes (-), starting with letter or underscore.";
pub const MISSING_COMMAND: &str = "You must provide the command to run";
pub const MISSING_ENV_VARS: &str = "You must provide the environment variables";
pub const RESTART_WITHOUT_IP: &str = "You can't restart this app because it doesn't have an IP yet.";
pub const REPOSITORY_REMOVAL_FAILED: &str = "Could not remove app's repository at git server. Aborting...";
pub const APP_UNAVAILABLE: &str = "App must be available to receive pushs.";
pub const ALREADY_BOUND: &str = "This app is already bound to this service instance.";
pub const NOT_BOUND: &str = "This app is not bound to this service instance.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl PlatformError {
    /// HTTP status code surfaced to API callers
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Forbidden(_) => 403,
            Self::Conflict(_) => 409,
            Self::PreconditionFailed(_) => 412,
            Self::BadRequest(_) => 400,
            Self::Upstream(_) => 502,
            Self::Internal(_) => 500,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(m)
            | Self::Forbidden(m)
            | Self::Conflict(m)
            | Self::PreconditionFailed(m)
            | Self::BadRequest(m)
            | Self::Upstream(m)
            | Self::Internal(m) => m,
        }
    }

    pub fn app_not_found(name: &str) -> Self {
        Self::NotFound(format!("App {} not found.", name))
    }

    pub fn app_exists(name: &str) -> Self {
        Self::Conflict(format!("There is already an app named \"{}\".", name))
    }
}

/// Failure of an operation that streams output (command fan-out, deploys).
///
/// Keeps everything produced before the failing step so callers can show how
/// far the operation got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineFailure {
    pub output: String,
    pub error: PlatformError,
}

impl PipelineFailure {
    pub fn new(output: impl Into<String>, error: PlatformError) -> Self {
        Self {
            output: output.into(),
            error,
        }
    }

    /// Failure raised before any output was produced
    pub fn bare(error: PlatformError) -> Self {
        Self::new(String::new(), error)
    }
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for PipelineFailure {}

impl From<PlatformError> for PipelineFailure {
    fn from(error: PlatformError) -> Self {
        Self::bare(error)
    }
}

impl From<RepositoryError> for PlatformError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::AlreadyExists(name) => PlatformError::app_exists(&name),
            other => PlatformError::Internal(other.to_string()),
        }
    }
}

impl From<ProvisionerError> for PlatformError {
    fn from(err: ProvisionerError) -> Self {
        PlatformError::Internal(err.to_string())
    }
}

impl From<GitServerError> for PlatformError {
    fn from(err: GitServerError) -> Self {
        PlatformError::Upstream(err.reason())
    }
}

impl From<CatalogError> for PlatformError {
    fn from(err: CatalogError) -> Self {
        PlatformError::Upstream(err.reason())
    }
}

impl From<ManifestError> for PlatformError {
    fn from(err: ManifestError) -> Self {
        PlatformError::Internal(err.to_string())
    }
}

impl From<PipelineFailure> for PlatformError {
    fn from(failure: PipelineFailure) -> Self {
        failure.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(PlatformError::app_not_found("x").status_code(), 404);
        assert_eq!(PlatformError::Forbidden(APP_ACCESS_DENIED.into()).status_code(), 403);
        assert_eq!(PlatformError::app_exists("x").status_code(), 409);
        assert_eq!(PlatformError::PreconditionFailed(INVALID_APP_NAME.into()).status_code(), 412);
        assert_eq!(PlatformError::BadRequest(MISSING_COMMAND.into()).status_code(), 400);
        assert_eq!(PlatformError::Upstream(REPOSITORY_REMOVAL_FAILED.into()).status_code(), 502);
        assert_eq!(PlatformError::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_literal_messages() {
        assert_eq!(PlatformError::app_not_found("someapp").message(), "App someapp not found.");
        assert_eq!(
            PlatformError::app_exists("someapp").to_string(),
            "There is already an app named \"someapp\"."
        );
    }

    #[test]
    fn test_repository_conflict_maps_to_app_exists() {
        let err: PlatformError = RepositoryError::AlreadyExists("someapp".into()).into();
        assert_eq!(err, PlatformError::app_exists("someapp"));
    }
}
