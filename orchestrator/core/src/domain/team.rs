// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Teams and users as seen by the control plane.
//!
//! Both are owned by the identity subsystem; the control plane only reads
//! them to decide who may operate on an app or a service instance.

use serde::{Deserialize, Serialize};

/// An already-authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub email: String,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub users: Vec<String>,
}

impl Team {
    pub fn new(name: impl Into<String>, users: Vec<String>) -> Self {
        Self {
            name: name.into(),
            users,
        }
    }

    pub fn contains_user(&self, email: &str) -> bool {
        self.users.iter().any(|u| u == email)
    }
}

/// De-duplicated union of the members of `teams`, in first-seen order
pub fn members_of(teams: &[Team]) -> Vec<String> {
    let mut users: Vec<String> = Vec::new();
    for user in teams.iter().flat_map(|t| t.users.iter()) {
        if !users.contains(user) {
            users.push(user.clone());
        }
    }
    users
}
