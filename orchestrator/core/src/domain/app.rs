// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # App Aggregate
//!
//! The `App` is the aggregate root of the control plane. It owns its units,
//! its environment and its log, and carries the names of the teams allowed to
//! operate on it.
//!
//! Invariants enforced here:
//! - app names match `^[a-z_][a-z0-9_-]{0,62}$`
//! - environment keys match `^[A-Za-z_][A-Za-z0-9_]*$`
//! - an app that has a team can never lose its last one
//! - log dates never go backwards in append order
//!
//! The aggregate serializes with PascalCase keys, which is also the shape the
//! HTTP API returns.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::domain::error::{
    PlatformError, INVALID_APP_NAME, LAST_TEAM_REVOKE, TEAM_ALREADY_GRANTED, TEAM_WITHOUT_ACCESS,
};
use crate::domain::team::{Team, User};

/// Replaces private variable values on every read path
pub const MASKED_VALUE: &str = "*** (private variable)";

static APP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,62}$").expect("valid app name pattern"));

static ENV_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid env name pattern"));

/// Provisioner-reported states a unit must be in to receive commands
pub mod unit_state {
    pub const STARTED: &str = "started";
    pub const RUNNING: &str = "running";
    pub const PENDING: &str = "pending";
}

pub fn validate_app_name(name: &str) -> Result<(), PlatformError> {
    if APP_NAME.is_match(name) {
        Ok(())
    } else {
        Err(PlatformError::PreconditionFailed(INVALID_APP_NAME.to_string()))
    }
}

pub fn is_valid_env_name(name: &str) -> bool {
    ENV_NAME.is_match(name)
}

// ============================================================================
// Unit
// ============================================================================

/// One running instance of an app on a provisioner machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Unit {
    pub name: String,
    #[serde(rename = "Type", default)]
    pub unit_type: String,
    pub machine: u32,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub agent_state: String,
    #[serde(default)]
    pub machine_agent_state: String,
    #[serde(default)]
    pub instance_state: String,
}

impl Unit {
    pub fn new(name: impl Into<String>, unit_type: impl Into<String>, machine: u32) -> Self {
        Self {
            name: name.into(),
            unit_type: unit_type.into(),
            machine,
            ip: String::new(),
            agent_state: unit_state::PENDING.to_string(),
            machine_agent_state: unit_state::PENDING.to_string(),
            instance_state: unit_state::PENDING.to_string(),
        }
    }

    /// Agent, machine and instance all report running
    pub fn is_started(&self) -> bool {
        self.agent_state == unit_state::STARTED
            && self.machine_agent_state == unit_state::RUNNING
            && self.instance_state == unit_state::RUNNING
    }

    /// Units commands are dispatched to. The IP is only checked by restart.
    pub fn is_ready(&self) -> bool {
        self.is_started()
    }
}

// ============================================================================
// EnvVar
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvVar {
    pub name: String,
    pub value: String,
    pub public: bool,
    /// Service instance that injected this variable, empty for user-set vars
    #[serde(default)]
    pub instance_name: String,
}

impl EnvVar {
    pub fn public(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            public: true,
            instance_name: String::new(),
        }
    }

    pub fn private(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            public: false,
            ..Self::public(name, value)
        }
    }

    pub fn from_instance(
        name: impl Into<String>,
        value: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            instance_name: instance.into(),
            ..Self::private(name, value)
        }
    }

    /// Value as shown by read APIs
    pub fn display_value(&self) -> &str {
        if self.public {
            &self.value
        } else {
            MASKED_VALUE
        }
    }
}

// ============================================================================
// LogEntry
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogEntry {
    pub date: DateTime<Utc>,
    pub message: String,
    pub source: String,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            message: message.into(),
            source: source.into(),
        }
    }
}

// ============================================================================
// App
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct App {
    pub name: String,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub units: Vec<Unit>,
    #[serde(default)]
    pub env: BTreeMap<String, EnvVar>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl App {
    /// Build a fresh app, rejecting names the platform cannot route
    pub fn new(name: impl Into<String>, framework: impl Into<String>) -> Result<Self, PlatformError> {
        let name = name.into();
        validate_app_name(&name)?;
        Ok(Self {
            name,
            framework: framework.into(),
            teams: Vec::new(),
            units: Vec::new(),
            env: BTreeMap::new(),
            logs: Vec::new(),
        })
    }

    // ------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------

    /// True when `user` belongs to any of the given teams that has access
    pub fn is_accessible_by(&self, user: &User, teams: &[Team]) -> bool {
        teams
            .iter()
            .any(|team| self.has_team(&team.name) && team.contains_user(&user.email))
    }

    pub fn has_team(&self, team: &str) -> bool {
        self.teams.iter().any(|t| t == team)
    }

    pub fn grant(&mut self, team: &str) -> Result<(), PlatformError> {
        if self.has_team(team) {
            return Err(PlatformError::Conflict(TEAM_ALREADY_GRANTED.to_string()));
        }
        self.teams.push(team.to_string());
        Ok(())
    }

    pub fn revoke(&mut self, team: &str) -> Result<(), PlatformError> {
        let Some(index) = self.teams.iter().position(|t| t == team) else {
            return Err(PlatformError::NotFound(TEAM_WITHOUT_ACCESS.to_string()));
        };
        if self.teams.len() == 1 {
            return Err(PlatformError::Forbidden(LAST_TEAM_REVOKE.to_string()));
        }
        self.teams.remove(index);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Units
    // ------------------------------------------------------------------

    pub fn ready_units(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(|u| u.is_ready())
    }

    pub fn has_ready_units(&self) -> bool {
        self.units.iter().any(Unit::is_ready)
    }

    pub fn all_units_have_ip(&self) -> bool {
        self.units.iter().all(|u| !u.ip.is_empty())
    }

    /// At least one unit, and every unit reports started
    pub fn is_available(&self) -> bool {
        !self.units.is_empty() && self.units.iter().all(Unit::is_started)
    }

    /// Identifier service backends know the app by: the first unit's IP
    pub fn host_identifier(&self) -> &str {
        self.units.first().map(|u| u.ip.as_str()).unwrap_or("")
    }

    // ------------------------------------------------------------------
    // Environment
    // ------------------------------------------------------------------

    /// Merge `vars` into the environment.
    ///
    /// With `public_only`, an incoming var never replaces an existing private
    /// one. Returns the names actually written.
    pub fn set_env(&mut self, vars: Vec<EnvVar>, public_only: bool) -> Vec<String> {
        let mut written = Vec::with_capacity(vars.len());
        for var in vars {
            if public_only && self.env.get(&var.name).is_some_and(|v| !v.public) {
                continue;
            }
            written.push(var.name.clone());
            self.env.insert(var.name.clone(), var);
        }
        written
    }

    /// Remove the named vars; private ones survive when `public_only` is set
    pub fn unset_env(&mut self, names: &[String], public_only: bool) -> Vec<String> {
        let mut removed = Vec::new();
        for name in names {
            let Some(existing) = self.env.get(name) else {
                continue;
            };
            if public_only && !existing.public {
                continue;
            }
            self.env.remove(name);
            removed.push(name.clone());
        }
        removed
    }

    /// Drop every variable injected by `instance`
    pub fn remove_instance_env(&mut self, instance: &str) -> Vec<String> {
        let names: Vec<String> = self
            .env
            .values()
            .filter(|v| v.instance_name == instance)
            .map(|v| v.name.clone())
            .collect();
        for name in &names {
            self.env.remove(name);
        }
        names
    }

    /// `NAME=value` lines for the requested names (all when empty), masked
    pub fn env_lines(&self, names: &[String]) -> String {
        let mut out = String::new();
        let mut push = |var: &EnvVar| {
            out.push_str(&var.name);
            out.push('=');
            out.push_str(var.display_value());
            out.push('\n');
        };
        if names.is_empty() {
            self.env.values().for_each(&mut push);
        } else {
            names.iter().filter_map(|n| self.env.get(n)).for_each(&mut push);
        }
        out
    }

    // ------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------

    /// Append entries, clamping dates so the log stays chronological
    pub fn push_logs(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        for mut entry in entries {
            if let Some(last) = self.logs.last() {
                if entry.date < last.date {
                    entry.date = last.date;
                }
            }
            self.logs.push(entry);
        }
    }

    /// Filter by source (when non-empty) and keep the last `lines` entries
    pub fn query_logs(&self, lines: i64, source: &str) -> Vec<LogEntry> {
        let matching: Vec<&LogEntry> = self
            .logs
            .iter()
            .filter(|entry| source.is_empty() || entry.source == source)
            .collect();
        let skip = if lines > 0 {
            matching.len().saturating_sub(lines as usize)
        } else {
            0
        };
        matching.into_iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ready_unit(name: &str, machine: u32, ip: &str) -> Unit {
        Unit {
            ip: ip.to_string(),
            agent_state: unit_state::STARTED.to_string(),
            machine_agent_state: unit_state::RUNNING.to_string(),
            instance_state: unit_state::RUNNING.to_string(),
            ..Unit::new(name, "python", machine)
        }
    }

    fn app_with_teams(teams: &[&str]) -> App {
        let mut app = App::new("someapp", "django").unwrap();
        app.teams = teams.iter().map(|t| t.to_string()).collect();
        app
    }

    #[test]
    fn test_app_name_validation() {
        assert!(validate_app_name("someapp").is_ok());
        assert!(validate_app_name("_private").is_ok());
        assert!(validate_app_name("my-app_2").is_ok());
        assert!(validate_app_name(&"a".repeat(63)).is_ok());

        for invalid in ["123myapp", "MyApp", "", "my.app", "-app"] {
            let err = validate_app_name(invalid).unwrap_err();
            assert_eq!(err, PlatformError::PreconditionFailed(INVALID_APP_NAME.to_string()));
        }
        assert!(validate_app_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_env_name_pattern() {
        assert!(is_valid_env_name("DATABASE_HOST"));
        assert!(is_valid_env_name("lower_case1"));
        assert!(!is_valid_env_name("1ABC"));
        assert!(!is_valid_env_name("A-B"));
    }

    #[test]
    fn test_access_requires_team_membership() {
        let app = app_with_teams(&["tsuruteam"]);
        let user = User::new("cidade@eu.com");
        let member = Team::new("tsuruteam", vec!["cidade@eu.com".to_string()]);
        let outsider = Team::new("other", vec!["cidade@eu.com".to_string()]);

        assert!(app.is_accessible_by(&user, &[member.clone()]));
        assert!(!app.is_accessible_by(&user, &[outsider]));
        assert!(!app.is_accessible_by(&User::new("someone@else.com"), &[member]));
    }

    #[test]
    fn test_grant_rejects_duplicates() {
        let mut app = app_with_teams(&["a"]);
        app.grant("b").unwrap();
        assert_eq!(app.teams, vec!["a", "b"]);
        assert_eq!(
            app.grant("b").unwrap_err(),
            PlatformError::Conflict(TEAM_ALREADY_GRANTED.to_string())
        );
    }

    #[test]
    fn test_revoke_never_orphans() {
        let mut app = app_with_teams(&["a", "b"]);
        app.revoke("a").unwrap();
        assert_eq!(app.teams, vec!["b"]);

        let err = app.revoke("b").unwrap_err();
        assert_eq!(err, PlatformError::Forbidden(LAST_TEAM_REVOKE.to_string()));
        assert_eq!(app.teams, vec!["b"]);

        let err = app.revoke("zzz").unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_set_env_public_only_preserves_private_values() {
        let mut app = app_with_teams(&["a"]);
        app.set_env(vec![EnvVar::private("DATABASE_PASSWORD", "s3cr3t")], false);

        let written = app.set_env(
            vec![
                EnvVar::public("DATABASE_PASSWORD", "exposed"),
                EnvVar::public("DATABASE_HOST", "localhost"),
            ],
            true,
        );

        assert_eq!(written, vec!["DATABASE_HOST"]);
        assert_eq!(app.env["DATABASE_PASSWORD"].value, "s3cr3t");
        assert!(!app.env["DATABASE_PASSWORD"].public);
        assert_eq!(app.env["DATABASE_HOST"].value, "localhost");
    }

    #[test]
    fn test_set_env_full_replace_without_public_only() {
        let mut app = app_with_teams(&["a"]);
        app.set_env(vec![EnvVar::private("DATABASE_PASSWORD", "s3cr3t")], false);
        app.set_env(vec![EnvVar::public("DATABASE_PASSWORD", "plain")], false);

        assert_eq!(app.env["DATABASE_PASSWORD"], EnvVar::public("DATABASE_PASSWORD", "plain"));
    }

    #[test]
    fn test_unset_env_respects_visibility() {
        let mut app = app_with_teams(&["a"]);
        app.set_env(
            vec![
                EnvVar::public("DATABASE_HOST", "localhost"),
                EnvVar::private("DATABASE_PASSWORD", "s3cr3t"),
            ],
            false,
        );

        let names = vec![
            "DATABASE_HOST".to_string(),
            "DATABASE_PASSWORD".to_string(),
            "MISSING".to_string(),
        ];
        let removed = app.unset_env(&names, true);
        assert_eq!(removed, vec!["DATABASE_HOST"]);
        assert!(app.env.contains_key("DATABASE_PASSWORD"));

        let removed = app.unset_env(&names, false);
        assert_eq!(removed, vec!["DATABASE_PASSWORD"]);
        assert!(app.env.is_empty());
    }

    #[test]
    fn test_remove_instance_env_only_touches_tagged_vars() {
        let mut app = app_with_teams(&["a"]);
        app.set_env(
            vec![
                EnvVar::public("DATABASE_HOST", "localhost"),
                EnvVar::from_instance("DATABASE_USER", "root", "my-mysql"),
                EnvVar::from_instance("DATABASE_PASSWORD", "s3cr3t", "my-mysql"),
                EnvVar::from_instance("CACHE_URL", "redis://", "my-redis"),
            ],
            false,
        );
        let before_host = app.env["DATABASE_HOST"].clone();
        let before_cache = app.env["CACHE_URL"].clone();

        let mut removed = app.remove_instance_env("my-mysql");
        removed.sort();

        assert_eq!(removed, vec!["DATABASE_PASSWORD", "DATABASE_USER"]);
        assert_eq!(app.env.len(), 2);
        assert_eq!(app.env["DATABASE_HOST"], before_host);
        assert_eq!(app.env["CACHE_URL"], before_cache);
    }

    #[test]
    fn test_env_lines_masks_private_values() {
        let mut app = app_with_teams(&["a"]);
        app.set_env(
            vec![
                EnvVar::public("DATABASE_HOST", "localhost"),
                EnvVar::private("DATABASE_PASSWORD", "s3cr3t"),
            ],
            false,
        );

        assert_eq!(
            app.env_lines(&[]),
            "DATABASE_HOST=localhost\nDATABASE_PASSWORD=*** (private variable)\n"
        );
        assert_eq!(
            app.env_lines(&["DATABASE_HOST".to_string(), "NOPE".to_string()]),
            "DATABASE_HOST=localhost\n"
        );
        assert_eq!(app.env["DATABASE_PASSWORD"].value, "s3cr3t");
    }

    #[test]
    fn test_unit_readiness() {
        let mut unit = ready_unit("someapp/0", 3, "10.10.10.10");
        assert!(unit.is_ready());

        unit.ip.clear();
        assert!(unit.is_ready());

        unit.ip = "10.10.10.10".to_string();
        unit.instance_state = "pending".to_string();
        assert!(!unit.is_ready());
    }

    #[test]
    fn test_availability_and_host_identifier() {
        let mut app = app_with_teams(&["a"]);
        assert!(!app.is_available());
        assert_eq!(app.host_identifier(), "");

        app.units.push(ready_unit("someapp/0", 1, "10.0.0.1"));
        app.units.push(ready_unit("someapp/1", 2, "10.0.0.2"));
        assert!(app.is_available());
        assert_eq!(app.host_identifier(), "10.0.0.1");

        app.units[1].agent_state = "down".to_string();
        assert!(!app.is_available());
        assert_eq!(app.ready_units().count(), 1);
    }

    #[test]
    fn test_query_logs_tail_and_source() {
        let mut app = app_with_teams(&["a"]);
        let start = Utc::now();
        for i in 0..10 {
            let source = if i % 2 == 0 { "app" } else { "stevedore" };
            app.push_logs([LogEntry {
                date: start + Duration::seconds(i),
                message: format!("message {}", i),
                source: source.to_string(),
            }]);
        }

        let tail = app.query_logs(3, "");
        let messages: Vec<_> = tail.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["message 7", "message 8", "message 9"]);

        let from_app = app.query_logs(0, "app");
        assert_eq!(from_app.len(), 5);
        assert!(from_app.iter().all(|l| l.source == "app"));

        let tail_app = app.query_logs(2, "app");
        let messages: Vec<_> = tail_app.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["message 6", "message 8"]);

        assert_eq!(app.query_logs(-1, "").len(), 10);
        assert_eq!(app.query_logs(100, "").len(), 10);
    }

    #[test]
    fn test_push_logs_keeps_chronological_order() {
        let mut app = app_with_teams(&["a"]);
        let now = Utc::now();
        app.push_logs([LogEntry {
            date: now,
            message: "first".into(),
            source: "app".into(),
        }]);
        app.push_logs([LogEntry {
            date: now - Duration::seconds(30),
            message: "late".into(),
            source: "app".into(),
        }]);

        assert_eq!(app.logs[1].date, now);
        assert_eq!(app.logs[1].message, "late");
    }

    #[test]
    fn test_wire_shape_is_pascal_case() {
        let mut app = app_with_teams(&["a"]);
        app.units.push(ready_unit("someapp/0", 1, "10.0.0.1"));
        let value = serde_json::to_value(&app).unwrap();

        assert_eq!(value["Name"], "someapp");
        assert_eq!(value["Framework"], "django");
        assert_eq!(value["Units"][0]["Ip"], "10.0.0.1");
        assert_eq!(value["Units"][0]["Type"], "python");
        assert_eq!(value["Units"][0]["AgentState"], "started");
    }
}
