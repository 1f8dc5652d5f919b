// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Control plane server mode
//!
//! Handles:
//! - Storage backend selection and migrations
//! - Bootstrap seeding of teams and services
//! - HTTP API and metrics listeners
//! - Graceful shutdown

pub mod bootstrap;
pub mod server;

pub use bootstrap::Repositories;
pub use server::{start_server, ServeOptions};
