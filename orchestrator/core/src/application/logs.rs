// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Log Store
//!
//! Appends go straight to the repository's atomic push, so they never race
//! with aggregate updates. Queries read the stored log and tail it.

use async_trait::async_trait;
use tracing::debug;

use crate::application::access::AccessGuard;
use crate::application::registry::AppRegistry;
use crate::domain::app::LogEntry;
use crate::domain::error::PlatformError;
use crate::domain::team::User;

/// Source tag of messages shipped by the running app
pub const APP_LOG_SOURCE: &str = "app";

#[async_trait]
pub trait LogService: Send + Sync {
    async fn append(&self, app: &str, message: &str, source: &str) -> Result<(), PlatformError>;

    /// Internal endpoint: every message is recorded with the `app` source
    async fn add_logs(&self, app: &str, messages: Vec<String>) -> Result<(), PlatformError>;

    /// Last `lines` entries (all when `lines <= 0`), filtered by `source` when non-empty
    async fn query(
        &self,
        user: &User,
        app: &str,
        lines: i64,
        source: &str,
    ) -> Result<Vec<LogEntry>, PlatformError>;
}

pub struct StandardLogService {
    registry: AppRegistry,
    guard: AccessGuard,
}

impl StandardLogService {
    pub fn new(registry: AppRegistry, guard: AccessGuard) -> Self {
        Self { registry, guard }
    }
}

#[async_trait]
impl LogService for StandardLogService {
    async fn append(&self, app: &str, message: &str, source: &str) -> Result<(), PlatformError> {
        self.registry
            .append_logs(app, vec![LogEntry::new(message, source)])
            .await
    }

    async fn add_logs(&self, app: &str, messages: Vec<String>) -> Result<(), PlatformError> {
        let count = messages.len();
        let entries = messages
            .into_iter()
            .map(|message| LogEntry::new(message, APP_LOG_SOURCE))
            .collect();
        self.registry.append_logs(app, entries).await?;
        debug!(app = %app, count, "App logs appended");
        Ok(())
    }

    async fn query(
        &self,
        user: &User,
        app: &str,
        lines: i64,
        source: &str,
    ) -> Result<Vec<LogEntry>, PlatformError> {
        let app = self.guard.authorized_app(app, user).await?;
        Ok(app.query_logs(lines, source))
    }
}
