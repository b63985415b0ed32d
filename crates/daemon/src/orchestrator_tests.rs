// SPDX-License-Identifier: MIT

use super::*;
use immap_adapters::{FakeReplicaAdapter, RpcCall, RpcError};
use immap_core::{test_support::global_ids, FakeClock};
use immap_store::InMemoryGateway;
use std::sync::Arc;

fn iid(s: &str) -> InstanceId {
    InstanceId::new(s)
}

struct Harness {
    po: PlacementOrchestrator<FakeClock>,
    pm: Arc<PlacementMap>,
    gw: Arc<InMemoryGateway>,
    replica: FakeReplicaAdapter,
}

fn harness() -> Harness {
    let pm = Arc::new(PlacementMap::new());
    let gw = Arc::new(InMemoryGateway::new());
    let replica = FakeReplicaAdapter::new();
    let policy: Arc<dyn Policy> = Arc::new(crate::policy::SimplePolicy::new());
    let po = PlacementOrchestrator::new(
        "image-map",
        pm.clone(),
        policy,
        gw.clone() as Arc<dyn ObjectStoreGateway>,
        Arc::new(replica.clone()) as Arc<dyn ReplicaAdapter>,
        FakeClock::new(),
        1024,
    );
    Harness { po, pm, gw, replica }
}

async fn durable_state(gw: &InMemoryGateway, global_id: &GlobalId) -> Option<ImageMapState> {
    match gw.read(&format!("image-map/{global_id}")).await {
        Ok(bytes) => Some(codec::decode_image_map(&bytes).unwrap().state),
        Err(immap_store::StoreError::NotFound) => None,
        Err(other) => panic!("unexpected store error: {other}"),
    }
}

#[tokio::test]
async fn bootstrap_two_peers_three_images() {
    let h = harness();
    h.po.add_instances(vec![iid("a"), iid("b")]).await.unwrap();

    for g in ["g1", "g2", "g3"] {
        let gid = global_ids(&[g]).remove(0);
        h.po
            .handle_update(
                "uuid-1",
                vec![AddedImage { global_id: gid, local_id: None, remote_id: None }],
                vec![],
            )
            .await
            .unwrap();
    }

    assert_eq!(h.pm.size(), 3);
    let mut sizes = vec![h.pm.instance_size(&iid("a")), h.pm.instance_size(&iid("b"))];
    sizes.sort();
    assert_eq!(sizes, vec![1, 2]);

    for g in ["g1", "g2", "g3"] {
        let gid = global_ids(&[g]).remove(0);
        assert_eq!(durable_state(&h.gw, &gid).await, Some(ImageMapState::Mapped));
    }

    let acquires = h.replica.calls().iter().filter(|c| matches!(c, RpcCall::Acquire { .. })).count();
    assert_eq!(acquires, 3);
}

#[tokio::test]
async fn peer_loss_triggers_shuffle_onto_the_survivor() {
    let h = harness();
    h.po.add_instances(vec![iid("a"), iid("b")]).await.unwrap();
    let mut gids = Vec::new();
    for g in ["g1", "g2", "g3"] {
        let gid = global_ids(&[g]).remove(0);
        h.po
            .handle_update(
                "uuid-1",
                vec![AddedImage { global_id: gid.clone(), local_id: None, remote_id: None }],
                vec![],
            )
            .await
            .unwrap();
        gids.push(gid);
    }

    h.po.remove_instances(vec![iid("a")]).await.unwrap();

    assert_eq!(h.pm.get_instance_ids(), vec![iid("b")]);
    for gid in &gids {
        assert_eq!(h.pm.lookup(gid), Some(iid("b")));
        assert_eq!(durable_state(&h.gw, gid).await, Some(ImageMapState::Mapped));
    }
}

#[tokio::test]
async fn acquire_failure_leaves_mapping_for_retry() {
    let h = harness();
    h.po.add_instances(vec![iid("a")]).await.unwrap();
    h.replica.fail_instance(&iid("a"), RpcError::Io("down".into()));

    let gid = global_ids(&["g1"]).remove(0);
    let err = h
        .po
        .handle_update(
            "uuid-1",
            vec![AddedImage { global_id: gid.clone(), local_id: None, remote_id: None }],
            vec![],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rpc(_)));
    assert_eq!(durable_state(&h.gw, &gid).await, Some(ImageMapState::Mapping));
}

#[tokio::test]
async fn handle_update_removed_image_deletes_durable_record() {
    let h = harness();
    h.po.add_instances(vec![iid("a")]).await.unwrap();
    let gid = global_ids(&["g1"]).remove(0);
    h.po
        .handle_update(
            "uuid-1",
            vec![AddedImage { global_id: gid.clone(), local_id: Some("local-1".into()), remote_id: None }],
            vec![],
        )
        .await
        .unwrap();
    assert_eq!(h.pm.lookup(&gid), Some(iid("a")));

    h.po.handle_update("uuid-1", vec![], vec![gid.clone()]).await.unwrap();

    assert_eq!(h.pm.lookup(&gid), None);
    assert_eq!(durable_state(&h.gw, &gid).await, None);
    let releases = h.replica.calls().iter().filter(|c| matches!(c, RpcCall::Release { .. })).count();
    assert_eq!(releases, 1);
}

#[tokio::test]
async fn drive_unmap_failure_leaves_pm_pointing_at_the_old_owner() {
    let h = harness();
    h.po.add_instances(vec![iid("a")]).await.unwrap();
    let gid = global_ids(&["g1"]).remove(0);
    h.po
        .handle_update(
            "uuid-1",
            vec![AddedImage { global_id: gid.clone(), local_id: None, remote_id: None }],
            vec![],
        )
        .await
        .unwrap();
    assert_eq!(h.pm.lookup(&gid), Some(iid("a")));

    // Release is the first replica call `drive_unmap` makes; failing it
    // means the durable delete (and `pm.unmap`) is never reached.
    h.replica.fail_instance(&iid("a"), RpcError::Io("down".into()));

    let err = h.po.handle_update("uuid-1", vec![], vec![gid.clone()]).await.unwrap_err();
    assert!(matches!(err, EngineError::Rpc(_)));

    // `pm` must still show the original owner: a later `handle_update`
    // reporting this id as `added` again has to see it via `lookup_or_map`,
    // not treat it as brand new and hand it to a second instance.
    assert_eq!(h.pm.lookup(&gid), Some(iid("a")));
    assert_eq!(durable_state(&h.gw, &gid).await, Some(ImageMapState::Unmapping));
}

#[tokio::test]
async fn peer_uuid_change_excludes_non_acking_peer_from_future_mappings() {
    let h = harness();
    h.po.add_instances(vec![iid("a"), iid("b")]).await.unwrap();
    h.replica.fail_instance(&iid("a"), RpcError::Io("unreachable".into()));

    h.po.handle_update("uuid-2", vec![], vec![]).await.unwrap();

    let add_peer_targets: Vec<_> = h
        .replica
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RpcCall::AddPeer { instance_id, .. } => Some(instance_id),
            _ => None,
        })
        .collect();
    // "a" is programmed to fail, so the fake never records its attempt
    // (see FakeReplicaAdapter::record_or_fail); "b" acked successfully.
    assert_eq!(add_peer_targets, vec![iid("b")]);

    // "a" never acked the uuid change, so a subsequent map must avoid it.
    let gid = global_ids(&["gX"]).remove(0);
    h.po
        .handle_update(
            "uuid-2",
            vec![AddedImage { global_id: gid.clone(), local_id: None, remote_id: None }],
            vec![],
        )
        .await
        .unwrap();
    assert_eq!(h.pm.lookup(&gid), Some(iid("b")));
}

#[tokio::test]
async fn concurrent_add_and_remove_serialize_through_the_gate() {
    let h = harness();
    h.po.add_instances(vec![iid("a"), iid("b")]).await.unwrap();

    let add_c = h.po.add_instances(vec![iid("c")]);
    let remove_a = h.po.remove_instances(vec![iid("a")]);
    let (add_result, remove_result) = tokio::join!(add_c, remove_a);
    add_result.unwrap();
    remove_result.unwrap();

    let mut remaining = h.pm.get_instance_ids();
    remaining.sort();
    assert_eq!(remaining, vec![iid("b"), iid("c")]);
}
