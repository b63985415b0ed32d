// SPDX-License-Identifier: MIT

//! A programmable [`ReplicaAdapter`] double for the daemon's own tests:
//! every call is recorded and, unless an outcome was set for it, succeeds.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use immap_core::{GlobalId, InstanceId};
use parking_lot::Mutex;

use crate::error::RpcError;
use crate::replica::ReplicaAdapter;

/// One recorded call against a [`FakeReplicaAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcCall {
    Acquire { instance_id: InstanceId, global_id: GlobalId, mirror_uuid: String, image_id: String },
    Release {
        instance_id: InstanceId,
        global_id: GlobalId,
        mirror_uuid: String,
        image_id: String,
        force: bool,
    },
    AddPeer { instance_id: InstanceId, old_uuid: String, new_uuid: String },
    PeerUpdate { instance_id: InstanceId, old_uuid: String, new_uuid: String },
}

#[derive(Default)]
struct State {
    calls: Vec<RpcCall>,
    outcomes: HashMap<InstanceId, RpcError>,
}

/// A [`ReplicaAdapter`] that records every call and fails only for
/// instances an outcome was programmed for via [`Self::fail_instance`].
#[derive(Clone, Default)]
pub struct FakeReplicaAdapter {
    inner: Arc<Mutex<State>>,
}

impl FakeReplicaAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call naming `instance_id` returns `error` instead
    /// of being recorded as a success.
    pub fn fail_instance(&self, instance_id: &InstanceId, error: RpcError) {
        self.inner.lock().outcomes.insert(instance_id.clone(), error);
    }

    pub fn calls(&self) -> Vec<RpcCall> {
        self.inner.lock().calls.clone()
    }

    fn record_or_fail(&self, instance_id: &InstanceId, call: RpcCall) -> Result<(), RpcError> {
        let mut state = self.inner.lock();
        if let Some(err) = state.outcomes.get(instance_id).cloned() {
            return Err(err);
        }
        state.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl ReplicaAdapter for FakeReplicaAdapter {
    async fn notify_image_acquire(
        &self,
        instance_id: &InstanceId,
        global_id: &GlobalId,
        mirror_uuid: &str,
        image_id: &str,
    ) -> Result<(), RpcError> {
        self.record_or_fail(
            instance_id,
            RpcCall::Acquire {
                instance_id: instance_id.clone(),
                global_id: global_id.clone(),
                mirror_uuid: mirror_uuid.to_string(),
                image_id: image_id.to_string(),
            },
        )
    }

    async fn notify_image_release(
        &self,
        instance_id: &InstanceId,
        global_id: &GlobalId,
        mirror_uuid: &str,
        image_id: &str,
        force: bool,
    ) -> Result<(), RpcError> {
        self.record_or_fail(
            instance_id,
            RpcCall::Release {
                instance_id: instance_id.clone(),
                global_id: global_id.clone(),
                mirror_uuid: mirror_uuid.to_string(),
                image_id: image_id.to_string(),
                force,
            },
        )
    }

    async fn notify_add_peer(
        &self,
        instance_id: &InstanceId,
        old_uuid: &str,
        new_uuid: &str,
    ) -> Result<(), RpcError> {
        self.record_or_fail(
            instance_id,
            RpcCall::AddPeer {
                instance_id: instance_id.clone(),
                old_uuid: old_uuid.to_string(),
                new_uuid: new_uuid.to_string(),
            },
        )
    }

    async fn notify_peer_update(
        &self,
        instance_id: &InstanceId,
        old_uuid: &str,
        new_uuid: &str,
    ) -> Result<(), RpcError> {
        self.record_or_fail(
            instance_id,
            RpcCall::PeerUpdate {
                instance_id: instance_id.clone(),
                old_uuid: old_uuid.to_string(),
                new_uuid: new_uuid.to_string(),
            },
        )
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
