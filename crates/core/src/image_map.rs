// SPDX-License-Identifier: MIT

//! The durable per-image record and its in-memory counterpart.

use crate::ids::{GlobalId, InstanceId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Lifecycle state of a single image's placement.
///
/// Durable states follow a strict cycle driven by the per-image state
/// machine: `UNASSIGNED` (never mapped, or synthesized on first
/// discovery) → `MAPPING` (durable write has moved the owner but the
/// new owner hasn't been told to acquire yet) → `MAPPED` (acquire
/// succeeded) → `UNMAPPING` (a remap or removal is releasing the
/// current owner). `MAPPING`/`UNMAPPING` are never terminal: restart
/// from either resumes the same transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageMapState {
    Unassigned,
    Mapping,
    Mapped,
    Unmapping,
}

impl std::fmt::Display for ImageMapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unassigned => "unassigned",
            Self::Mapping => "mapping",
            Self::Mapped => "mapped",
            Self::Unmapping => "unmapping",
        })
    }
}

impl ImageMapState {
    pub fn as_wire_byte(self) -> u8 {
        match self {
            ImageMapState::Unassigned => 0,
            ImageMapState::Mapping => 1,
            ImageMapState::Mapped => 2,
            ImageMapState::Unmapping => 3,
        }
    }

    pub fn from_wire_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ImageMapState::Unassigned),
            1 => Some(ImageMapState::Mapping),
            2 => Some(ImageMapState::Mapped),
            3 => Some(ImageMapState::Unmapping),
            _ => None,
        }
    }
}

/// Durable per-image record, stored in the object store under
/// `<image-map-scope>/<global_id>`. Only the orchestrator writes this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMap {
    pub instance_id: InstanceId,
    pub state: ImageMapState,
    pub mapped_time_ns: u64,
}

impl ImageMap {
    pub fn new(instance_id: InstanceId, state: ImageMapState, mapped_time_ns: u64) -> Self {
        Self { instance_id, state, mapped_time_ns }
    }
}

/// In-memory placement record for a single image.
///
/// Two id fields because an image has distinct identifiers on the local
/// and remote clusters, either of which may still be unknown;
/// `remote_id` is `None` iff the image has never been observed on the
/// remote side. Identity and ordering are defined on `global_id` alone —
/// `local_id`/`remote_id`/`state` are updatable payload, never part of
/// the key, matching the source's `ImageSpec` (a `std::set` ordered only
/// by `global_id`).
#[derive(Debug, Clone)]
pub struct ImageSpec {
    pub global_id: GlobalId,
    pub local_id: Option<String>,
    pub remote_id: Option<String>,
    pub state: ImageMapState,
}

impl ImageSpec {
    /// A freshly discovered image: nothing but its global id is known yet.
    pub fn unassigned(global_id: GlobalId) -> Self {
        Self { global_id, local_id: None, remote_id: None, state: ImageMapState::Unassigned }
    }
}

impl PartialEq for ImageSpec {
    fn eq(&self, other: &Self) -> bool {
        self.global_id == other.global_id
    }
}
impl Eq for ImageSpec {}

impl PartialOrd for ImageSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ImageSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.global_id.cmp(&other.global_id)
    }
}

#[cfg(test)]
#[path = "image_map_tests.rs"]
mod tests;
