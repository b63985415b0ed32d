// SPDX-License-Identifier: MIT

//! The pluggable rebalancing strategy (spec §4.3 "Policy contract").
//!
//! `do_map` and `do_shuffle` never touch the object store or any peer;
//! they only look at the in-memory index and report the moves the
//! placement map should apply. Keeping them synchronous is what lets
//! the placement map hold its lock across a full policy decision
//! without ever suspending.

use std::collections::{BTreeMap, BTreeSet};

use immap_core::{EngineError, GlobalId, ImageSpec, InstanceId};

/// Which membership change triggered a shuffle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuffleKind {
    /// `changed_ids` are newly added instances; their buckets already
    /// exist (possibly non-empty, from a durable-map load) by the time
    /// `do_shuffle` runs.
    Added,
    /// `changed_ids` are departing instances; their buckets still hold
    /// their images at call time and must be fully drained.
    Removed,
}

pub type RemapPlan = BTreeMap<GlobalId, (InstanceId, InstanceId)>;

/// A rebalancing strategy over the placement map's in-memory index.
pub trait Policy: Send + Sync {
    /// Picks the instance a freshly discovered image should land on.
    fn do_map(
        &self,
        by_instance: &BTreeMap<InstanceId, BTreeSet<ImageSpec>>,
        global_id: &GlobalId,
    ) -> Result<InstanceId, EngineError>;

    /// Plans every move a membership change requires. The returned map
    /// is `global_id -> (from, to)`; a `from == to` entry is a
    /// self-remap asking the orchestrator to re-drive an image's state
    /// machine without actually changing its owner.
    fn do_shuffle(
        &self,
        by_instance: &BTreeMap<InstanceId, BTreeSet<ImageSpec>>,
        changed_ids: &[InstanceId],
        kind: ShuffleKind,
    ) -> Result<RemapPlan, EngineError>;
}

/// The reference policy: least-loaded placement, target-balanced
/// shuffles (spec §4.3).
#[derive(Debug, Default, Clone, Copy)]
pub struct SimplePolicy;

impl SimplePolicy {
    pub fn new() -> Self {
        Self
    }
}

fn target_per_instance(total: usize, live_count: usize) -> usize {
    if live_count == 0 {
        0
    } else {
        total.div_ceil(live_count)
    }
}

impl Policy for SimplePolicy {
    fn do_map(
        &self,
        by_instance: &BTreeMap<InstanceId, BTreeSet<ImageSpec>>,
        _global_id: &GlobalId,
    ) -> Result<InstanceId, EngineError> {
        by_instance
            .iter()
            .min_by_key(|(_, specs)| specs.len())
            .map(|(id, _)| id.clone())
            .ok_or_else(|| EngineError::PolicyViolation("no live instances to map onto".into()))
    }

    fn do_shuffle(
        &self,
        by_instance: &BTreeMap<InstanceId, BTreeSet<ImageSpec>>,
        changed_ids: &[InstanceId],
        kind: ShuffleKind,
    ) -> Result<RemapPlan, EngineError> {
        match kind {
            ShuffleKind::Added => shuffle_added(by_instance, changed_ids),
            ShuffleKind::Removed => shuffle_removed(by_instance, changed_ids),
        }
    }
}

fn total_images(by_instance: &BTreeMap<InstanceId, BTreeSet<ImageSpec>>) -> usize {
    by_instance.values().map(|s| s.len()).sum()
}

fn shuffle_removed(
    by_instance: &BTreeMap<InstanceId, BTreeSet<ImageSpec>>,
    departing: &[InstanceId],
) -> Result<RemapPlan, EngineError> {
    let total = total_images(by_instance);
    let live_count = by_instance.len().saturating_sub(departing.len());
    let target = target_per_instance(total, live_count);

    let mut survivors: Vec<InstanceId> =
        by_instance.keys().filter(|id| !departing.contains(id)).cloned().collect();
    survivors.sort();

    if survivors.is_empty() {
        if departing.iter().all(|id| by_instance.get(id).map_or(true, |s| s.is_empty())) {
            return Ok(BTreeMap::new());
        }
        return Err(EngineError::PolicyViolation(
            "no surviving instances to absorb a shrink".into(),
        ));
    }

    // Running counts, seeded from current occupancy, track planned
    // arrivals so repeated picks within this call converge on target.
    let mut counts: BTreeMap<InstanceId, usize> =
        survivors.iter().map(|id| (id.clone(), by_instance[id].len())).collect();

    let mut remapped = RemapPlan::new();
    for from in departing {
        let Some(specs) = by_instance.get(from) else { continue };
        for spec in specs {
            let Some(to_idx) = survivors.iter().enumerate().min_by_key(|(_, id)| counts[*id]).map(|(i, _)| i)
            else {
                continue;
            };
            let to = survivors[to_idx].clone();
            let Some(count) = counts.get_mut(&to) else { continue };
            *count += 1;
            remapped.insert(spec.global_id.clone(), (from.clone(), to));
        }
    }
    let _ = target; // informative only; the greedy min-count pick already converges on it
    Ok(remapped)
}

fn shuffle_added(
    by_instance: &BTreeMap<InstanceId, BTreeSet<ImageSpec>>,
    added: &[InstanceId],
) -> Result<RemapPlan, EngineError> {
    let total = total_images(by_instance);
    let live_count = by_instance.len();
    let target = target_per_instance(total, live_count);

    let mut remapped = RemapPlan::new();

    // Bootstrap: anything already sitting in a newly-added bucket (from a
    // durable-map load) gets a self-remap so the orchestrator re-drives
    // its state machine, even though ownership doesn't change.
    for id in added {
        if let Some(specs) = by_instance.get(id) {
            for spec in specs {
                remapped.insert(spec.global_id.clone(), (id.clone(), id.clone()));
            }
        }
    }

    let mut counts: BTreeMap<InstanceId, usize> =
        by_instance.iter().map(|(id, s)| (id.clone(), s.len())).collect();

    let mut donors: Vec<InstanceId> = by_instance
        .keys()
        .filter(|id| !added.contains(id) && counts[*id] > target)
        .cloned()
        .collect();
    donors.sort();

    let mut receivers: Vec<InstanceId> = by_instance
        .keys()
        .filter(|id| counts[*id] < target)
        .cloned()
        .collect();
    receivers.sort();

    for donor in donors {
        loop {
            if counts[&donor] <= target {
                break;
            }
            let Some(receiver) =
                receivers.iter().find(|id| counts[*id] < target).cloned()
            else {
                break;
            };
            let spec = by_instance[&donor]
                .iter()
                .find(|spec| !remapped.contains_key(&spec.global_id))
                .cloned();
            let Some(spec) = spec else { break };
            let Some(donor_count) = counts.get_mut(&donor) else { break };
            *donor_count -= 1;
            let Some(receiver_count) = counts.get_mut(&receiver) else { break };
            *receiver_count += 1;
            remapped.insert(spec.global_id.clone(), (donor.clone(), receiver.clone()));
        }
    }

    Ok(remapped)
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
