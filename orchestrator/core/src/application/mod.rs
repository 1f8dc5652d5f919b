// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod registry;
pub mod access;
pub mod dispatcher;
pub mod environment;
pub mod binding;
pub mod deploy;
pub mod logs;
pub mod app_service;
pub mod control_plane;

// Re-export services for convenience
pub use access::AccessGuard;
pub use app_service::{AppInfo, AppService, CreatedApp, StandardAppService};
pub use control_plane::{Collaborators, ControlPlane};
pub use binding::{BindingService, ReleasePolicy, StandardBindingService};
pub use deploy::{DeploymentPipeline, DeploymentService, PipelineStage, Transcript};
pub use dispatcher::{CommandDispatcher, RemoteCommandDispatcher};
pub use environment::{EnvironmentManager, EnvironmentService};
pub use logs::{LogService, StandardLogService};
pub use registry::{AppRegistry, NamedLocks};
