// SPDX-License-Identifier: MIT

//! The peer-RPC boundary (spec §6).

use async_trait::async_trait;
use immap_core::{GlobalId, InstanceId};

use crate::error::RpcError;

/// Calls the placement orchestrator makes against a peer daemon.
///
/// Every call names the target `instance_id` explicitly; a real
/// implementation resolves that to a transport connection (or an OSG
/// `notify`, per spec §6) itself.
#[async_trait]
pub trait ReplicaAdapter: Send + Sync {
    /// Tells `instance_id` to take ownership of `global_id`.
    async fn notify_image_acquire(
        &self,
        instance_id: &InstanceId,
        global_id: &GlobalId,
        mirror_uuid: &str,
        image_id: &str,
    ) -> Result<(), RpcError>;

    /// Tells `instance_id` to give up ownership of `global_id`. `force`
    /// skips any graceful drain the peer would otherwise attempt.
    async fn notify_image_release(
        &self,
        instance_id: &InstanceId,
        global_id: &GlobalId,
        mirror_uuid: &str,
        image_id: &str,
        force: bool,
    ) -> Result<(), RpcError>;

    /// Tells `instance_id` a new peer has joined under `new_uuid`,
    /// previously known (if at all) as `old_uuid`.
    async fn notify_add_peer(
        &self,
        instance_id: &InstanceId,
        old_uuid: &str,
        new_uuid: &str,
    ) -> Result<(), RpcError>;

    /// Tells `instance_id` the local peer-uuid changed from `old_uuid`
    /// to `new_uuid`.
    async fn notify_peer_update(
        &self,
        instance_id: &InstanceId,
        old_uuid: &str,
        new_uuid: &str,
    ) -> Result<(), RpcError>;
}
