// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;
pub mod db;
pub mod juju;
pub mod gandalf;
pub mod service_catalog;
pub mod fakes;

pub use gandalf::GandalfClient;
pub use juju::JujuProvisioner;
pub use service_catalog::HttpServiceCatalog;
