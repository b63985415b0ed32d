// SPDX-License-Identifier: MIT

//! The in-memory `instance_id -> set<ImageSpec>` index (spec §4.3),
//! backed by the durable per-image record the orchestrator writes to
//! the object store.

use std::collections::{BTreeMap, BTreeSet};

use immap_core::{EngineError, GlobalId, ImageSpec, InstanceId};
use immap_store::{codec, ObjectStoreGateway, StoreError};
use parking_lot::RwLock;
use tracing::debug;

use crate::policy::{Policy, RemapPlan, ShuffleKind};

#[derive(Default)]
struct Index {
    by_instance: BTreeMap<InstanceId, BTreeSet<ImageSpec>>,
}

/// Thread-safe placement index. Every method that only reads takes a
/// shared lock; every method that mutates takes an exclusive lock, and
/// none hold it across an `.await`.
#[derive(Default)]
pub struct PlacementMap {
    inner: RwLock<Index>,
}

impl PlacementMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-creates empty buckets for `initial_instance_ids`, then
    /// paginates the durable map under `scope` and routes each entry
    /// into its owning bucket. Entries whose `instance_id` is absent
    /// from `initial_instance_ids` are dropped — they are re-placed by
    /// the shuffle that follows.
    pub async fn load(
        &self,
        gateway: &dyn ObjectStoreGateway,
        scope: &str,
        initial_instance_ids: &[InstanceId],
        page_size: u32,
    ) -> Result<(), StoreError> {
        {
            let mut index = self.inner.write();
            for id in initial_instance_ids {
                index.by_instance.entry(id.clone()).or_default();
            }
        }

        let prefix = format!("{scope}/");
        let mut start_after: Option<String> = None;
        loop {
            let (entries, has_more) = gateway
                .list_range(&prefix, start_after.as_deref(), page_size)
                .await?;
            let mut last_key = None;
            {
                let mut index = self.inner.write();
                for (key, bytes) in &entries {
                    last_key = Some(key.clone());
                    let global_id = GlobalId::new(
                        key.strip_prefix(&prefix).unwrap_or(key).to_string(),
                    );
                    let record = match codec::decode_image_map(bytes) {
                        Ok(record) => record,
                        Err(err) => {
                            debug!(%global_id, %err, "dropping corrupt durable record during load");
                            continue;
                        }
                    };
                    if !initial_instance_ids.contains(&record.instance_id) {
                        continue;
                    }
                    let bucket = index.by_instance.entry(record.instance_id.clone()).or_default();
                    bucket.insert(ImageSpec {
                        global_id,
                        local_id: None,
                        remote_id: None,
                        state: record.state,
                    });
                }
            }
            if !has_more {
                break;
            }
            start_after = last_key;
            if start_after.is_none() {
                break;
            }
        }
        Ok(())
    }

    pub fn get_instance_ids(&self) -> Vec<InstanceId> {
        self.inner.read().by_instance.keys().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.inner.read().by_instance.values().map(|s| s.len()).sum()
    }

    /// Snapshot of one instance's current occupancy, for tests.
    pub fn instance_size(&self, instance_id: &InstanceId) -> usize {
        self.inner.read().by_instance.get(instance_id).map_or(0, |s| s.len())
    }

    /// Linear scan over every instance's set; `None` is the spec's
    /// unmapped sentinel.
    pub fn lookup(&self, global_id: &GlobalId) -> Option<InstanceId> {
        let index = self.inner.read();
        index
            .by_instance
            .iter()
            .find(|(_, specs)| specs.contains(&ImageSpec::unassigned(global_id.clone())))
            .map(|(id, _)| id.clone())
    }

    /// Owned copy of the spec currently held for `global_id`, wherever
    /// its bucket is. `None` if the image is unmapped.
    pub fn get_spec(&self, global_id: &GlobalId) -> Option<ImageSpec> {
        let index = self.inner.read();
        index
            .by_instance
            .values()
            .find_map(|specs| specs.get(&ImageSpec::unassigned(global_id.clone())).cloned())
    }

    /// Updates the payload `local_id` for `global_id` in place, without
    /// touching its bucket or any other field. `false` if unmapped.
    pub fn set_local_id(&self, global_id: &GlobalId, local_id: String) -> bool {
        let mut index = self.inner.write();
        for specs in index.by_instance.values_mut() {
            if let Some(mut spec) = specs.take(&ImageSpec::unassigned(global_id.clone())) {
                spec.local_id = Some(local_id);
                specs.insert(spec);
                return true;
            }
        }
        false
    }

    /// Picks an instance via `policy.do_map`, inserts `spec`, and
    /// asserts the global id was not already mapped anywhere (I1).
    pub fn map(&self, policy: &dyn Policy, spec: ImageSpec) -> Result<InstanceId, EngineError> {
        let mut index = self.inner.write();
        if index.by_instance.values().any(|s| s.contains(&spec)) {
            return Err(EngineError::PolicyViolation(format!(
                "{} is already mapped",
                spec.global_id
            )));
        }
        let chosen = policy.do_map(&index.by_instance, &spec.global_id)?;
        index.by_instance.entry(chosen.clone()).or_default().insert(spec);
        Ok(chosen)
    }

    /// Removes `global_id` from whichever bucket holds it.
    pub fn unmap(&self, global_id: &GlobalId) -> bool {
        let mut index = self.inner.write();
        for specs in index.by_instance.values_mut() {
            if specs.remove(&ImageSpec::unassigned(global_id.clone())) {
                return true;
            }
        }
        false
    }

    /// Moves `global_id` from `from` to `to`. A no-op returning `true`
    /// if `from == to`. Returns `false` if `from` does not currently
    /// hold `global_id`.
    pub fn remap(&self, from: &InstanceId, to: &InstanceId, global_id: &GlobalId) -> bool {
        if from == to {
            return true;
        }
        let mut index = self.inner.write();
        let Some(spec) = index
            .by_instance
            .get_mut(from)
            .and_then(|specs| specs.take(&ImageSpec::unassigned(global_id.clone())))
        else {
            return false;
        };
        index.by_instance.entry(to.clone()).or_default().insert(spec);
        true
    }

    /// Atomic lookup-then-map fallback: returns the current owner, or
    /// maps a freshly synthesized `UNASSIGNED` spec if none exists yet.
    pub fn lookup_or_map(
        &self,
        policy: &dyn Policy,
        global_id: &GlobalId,
    ) -> Result<InstanceId, EngineError> {
        let mut index = self.inner.write();
        if let Some((id, _)) = index
            .by_instance
            .iter()
            .find(|(_, specs)| specs.contains(&ImageSpec::unassigned(global_id.clone())))
        {
            return Ok(id.clone());
        }
        let chosen = policy.do_map(&index.by_instance, global_id)?;
        index
            .by_instance
            .entry(chosen.clone())
            .or_default()
            .insert(ImageSpec::unassigned(global_id.clone()));
        Ok(chosen)
    }

    /// Pre-creates buckets for added instances (for `ShuffleKind::Added`),
    /// plans moves via `policy.do_shuffle`, applies every move, and —
    /// for `ShuffleKind::Removed` — asserts the departing buckets ended
    /// up empty and erases them.
    pub fn shuffle(
        &self,
        policy: &dyn Policy,
        changed_ids: &[InstanceId],
        kind: ShuffleKind,
    ) -> Result<RemapPlan, EngineError> {
        let plan = {
            let mut index = self.inner.write();
            if kind == ShuffleKind::Added {
                for id in changed_ids {
                    index.by_instance.entry(id.clone()).or_default();
                }
            }
            policy.do_shuffle(&index.by_instance, changed_ids, kind)?
        };

        for (global_id, (from, to)) in &plan {
            if !self.remap(from, to, global_id) {
                return Err(EngineError::invalid(
                    global_id.to_string(),
                    format!("remap source {from} does not hold the image"),
                ));
            }
        }

        if kind == ShuffleKind::Removed {
            let mut index = self.inner.write();
            for id in changed_ids {
                if let Some(bucket) = index.by_instance.get(id) {
                    if !bucket.is_empty() {
                        return Err(EngineError::PolicyViolation(format!(
                            "departing instance {id} still holds images after shuffle"
                        )));
                    }
                }
                index.by_instance.remove(id);
            }
        }

        Ok(plan)
    }
}

#[cfg(test)]
#[path = "placement_map_tests.rs"]
mod tests;
