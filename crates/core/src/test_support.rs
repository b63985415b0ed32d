// SPDX-License-Identifier: MIT

//! Shared test helpers, gated behind `test-support` so downstream crates
//! can depend on the same builders their own tests use.

use crate::ids::GlobalId;
use crate::image_map::{ImageMap, ImageMapState};
use crate::ids::InstanceId;

/// A `MAPPED` durable record for `instance` at a fixed fake timestamp,
/// for tests that only care about the shape of the record, not time.
pub fn mapped(instance: &str) -> ImageMap {
    ImageMap::new(InstanceId::new(instance), ImageMapState::Mapped, 1_000_000_000)
}

pub fn global_ids(ids: &[&str]) -> Vec<GlobalId> {
    ids.iter().map(|s| GlobalId::new(*s)).collect()
}
