// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # HTTP API
//!
//! Axum router exposing the control plane. Authentication happens upstream;
//! the authenticated e-mail arrives in the `X-Stevedore-User` header. Routes
//! called by the repository host and the provisioner (`avaliable`,
//! `repository/clone`, `log` appends, unit reports) take no user.
//!
//! Failed pipelines answer with the partial transcript as body, the error's
//! status code, and the error message in `X-Stevedore-Error`.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::app_service::AppService;
use crate::application::binding::BindingService;
use crate::application::control_plane::ControlPlane;
use crate::application::deploy::DeploymentService;
use crate::application::environment::{parse_assignments, parse_names, EnvironmentService};
use crate::application::logs::LogService;
use crate::domain::app::Unit;
use crate::domain::error::{PipelineFailure, PlatformError};
use crate::domain::team::User;

pub const USER_HEADER: &str = "x-stevedore-user";
pub const ERROR_HEADER: &str = "x-stevedore-error";

const TEXT: &str = "text";
const INVALID_LINES: &str = "Parameter lines must be an integer";

pub struct AppState {
    pub apps: Arc<dyn AppService>,
    pub environment: Arc<dyn EnvironmentService>,
    pub deployments: Arc<dyn DeploymentService>,
    pub logs: Arc<dyn LogService>,
    pub bindings: Arc<dyn BindingService>,
}

impl From<ControlPlane> for AppState {
    fn from(plane: ControlPlane) -> Self {
        Self {
            apps: plane.apps,
            environment: plane.environment,
            deployments: plane.deployments,
            logs: plane.logs,
            bindings: plane.bindings,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/apps", get(list_apps).post(create_app))
        .route("/apps/{name}", get(app_info).delete(delete_app))
        .route("/apps/{name}/avaliable", get(availability))
        .route("/apps/{name}/repository/clone", get(clone_repository))
        .route("/apps/{name}/restart", get(restart))
        .route("/apps/{name}/run", post(run_command))
        .route("/apps/{name}/env", get(get_env).post(set_env).delete(unset_env))
        .route("/apps/{name}/log", get(query_logs).post(add_logs))
        .route("/apps/{name}/units", put(report_units))
        .route("/apps/{name}/{team}", put(grant_team).delete(revoke_team))
        .route("/services/instances/{instance}/{name}", put(bind).delete(unbind))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// ============================================================================
// Extractors and responses
// ============================================================================

/// Caller identity taken from the `X-Stevedore-User` header
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(|email| AuthenticatedUser(User::new(email)))
            .ok_or((StatusCode::UNAUTHORIZED, "You must provide the user header"))
    }
}

fn status_of(error: &PlatformError) -> StatusCode {
    StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        (status_of(&self), self.message().to_string()).into_response()
    }
}

impl IntoResponse for PipelineFailure {
    fn into_response(self) -> Response {
        let mut response = (
            status_of(&self.error),
            [(header::CONTENT_TYPE, TEXT)],
            self.output,
        )
            .into_response();
        if let Ok(value) = HeaderValue::from_str(&header_safe(self.error.message())) {
            response.headers_mut().insert(ERROR_HEADER, value);
        }
        response
    }
}

/// Header values cannot carry control characters
fn header_safe(message: &str) -> String {
    message
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

fn text(body: String) -> Response {
    ([(header::CONTENT_TYPE, TEXT)], body).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn list_apps(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Response, PlatformError> {
    let apps = state.apps.list(&user).await?;
    if apps.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(apps).into_response())
}

#[derive(Debug, Deserialize)]
pub struct CreateAppRequest {
    pub name: String,
    pub framework: String,
}

async fn create_app(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(request): Json<CreateAppRequest>,
) -> Result<Response, PlatformError> {
    let created = state
        .apps
        .create(&user, &request.name, &request.framework)
        .await?;
    Ok(Json(created).into_response())
}

async fn app_info(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(name): Path<String>,
) -> Result<Response, PlatformError> {
    Ok(Json(state.apps.info(&user, &name).await?).into_response())
}

async fn delete_app(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(name): Path<String>,
) -> Result<StatusCode, PlatformError> {
    state.apps.delete(&user, &name).await?;
    Ok(StatusCode::OK)
}

async fn availability(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, PlatformError> {
    state.apps.availability(&name).await?;
    Ok(StatusCode::OK)
}

async fn clone_repository(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, PipelineFailure> {
    Ok(text(state.deployments.deploy(&name).await?))
}

async fn restart(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(name): Path<String>,
) -> Result<Response, PipelineFailure> {
    Ok(text(state.deployments.restart(&user, &name).await?))
}

async fn run_command(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(name): Path<String>,
    body: String,
) -> Result<Response, PipelineFailure> {
    Ok(text(state.apps.run_command(&user, &name, &body).await?))
}

async fn get_env(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(name): Path<String>,
    body: String,
) -> Result<Response, PlatformError> {
    let names = parse_names(&body);
    Ok(text(state.environment.get_env(&user, &name, &names).await?))
}

async fn set_env(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(name): Path<String>,
    body: String,
) -> Result<StatusCode, PlatformError> {
    let vars = parse_assignments(&body)?;
    state.environment.set_env(&user, &name, vars).await?;
    Ok(StatusCode::OK)
}

async fn unset_env(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(name): Path<String>,
    body: String,
) -> Result<StatusCode, PlatformError> {
    state
        .environment
        .unset_env(&user, &name, &parse_names(&body))
        .await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub lines: Option<String>,
    pub source: Option<String>,
}

async fn query_logs(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(name): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Response, PlatformError> {
    let lines = match query.lines.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| PlatformError::BadRequest(INVALID_LINES.to_string()))?,
    };
    let source = query.source.unwrap_or_default();
    let logs = state.logs.query(&user, &name, lines, &source).await?;
    Ok(Json(logs).into_response())
}

async fn add_logs(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(messages): Json<Vec<String>>,
) -> Result<StatusCode, PlatformError> {
    state.logs.add_logs(&name, messages).await?;
    Ok(StatusCode::OK)
}

async fn report_units(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(units): Json<Vec<Unit>>,
) -> Result<StatusCode, PlatformError> {
    state.apps.report_units(&name, units).await?;
    Ok(StatusCode::OK)
}

async fn grant_team(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((name, team)): Path<(String, String)>,
) -> Result<StatusCode, PlatformError> {
    state.apps.grant_team(&user, &name, &team).await?;
    Ok(StatusCode::OK)
}

async fn revoke_team(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((name, team)): Path<(String, String)>,
) -> Result<StatusCode, PlatformError> {
    state.apps.revoke_team(&user, &name, &team).await?;
    Ok(StatusCode::OK)
}

async fn bind(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((instance, name)): Path<(String, String)>,
) -> Result<Response, PlatformError> {
    let names = state.bindings.bind(&user, &instance, &name).await?;
    Ok(Json(names).into_response())
}

async fn unbind(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path((instance, name)): Path<(String, String)>,
) -> Result<StatusCode, PlatformError> {
    state.bindings.unbind(&user, &instance, &name).await?;
    Ok(StatusCode::OK)
}
