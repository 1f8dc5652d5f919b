// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Deploy hook manifest shipped inside the app's code.
//!
//! ```yaml
//! pre-restart:
//!   - python manage.py migrate
//! pos-restart: touch /tmp/restarted
//! ```
//!
//! Each kind accepts a single command or a list. A missing file or a missing
//! kind means no hooks for that stage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookManifest {
    #[serde(rename = "pre-restart", default, deserialize_with = "one_or_many")]
    pub pre_restart: Vec<String>,

    #[serde(rename = "pos-restart", default, deserialize_with = "one_or_many")]
    pub pos_restart: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid hook manifest: {0}")]
    Invalid(#[from] serde_yaml::Error),
}

impl HookManifest {
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let manifest: Option<Self> = serde_yaml::from_str(content)?;
        Ok(manifest.unwrap_or_default())
    }

    pub fn is_empty(&self) -> bool {
        self.pre_restart.is_empty() && self.pos_restart.is_empty()
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(cmd)) => vec![cmd],
        Some(OneOrMany::Many(cmds)) => cmds,
        None => Vec::new(),
    })
}
