// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! App aggregate, identity and catalog types, collaborator interfaces.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Aggregates, invariants and the ports the control plane talks through

pub mod app;
pub mod team;
pub mod service;
pub mod error;
pub mod hooks;
pub mod repository;
pub mod provisioner;
pub mod git;
pub mod catalog;
pub mod platform_config;
