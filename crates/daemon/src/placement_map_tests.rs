// SPDX-License-Identifier: MIT

use super::*;
use immap_core::test_support::{global_ids, mapped};
use immap_store::{InMemoryGateway, Precondition};

fn iid(s: &str) -> InstanceId {
    InstanceId::new(s)
}

#[test]
fn map_picks_least_loaded_and_rejects_duplicate() {
    let pm = PlacementMap::new();
    let policy = crate::policy::SimplePolicy::new();
    pm.inner.write().by_instance.insert(iid("a"), BTreeSet::new());
    pm.inner.write().by_instance.insert(iid("b"), BTreeSet::new());

    let gid = global_ids(&["g1"]).remove(0);
    let chosen = pm.map(&policy, ImageSpec::unassigned(gid.clone())).unwrap();
    assert_eq!(pm.lookup(&gid), Some(chosen));

    let err = pm.map(&policy, ImageSpec::unassigned(gid)).unwrap_err();
    assert!(matches!(err, EngineError::PolicyViolation(_)));
}

#[test]
fn unmap_removes_from_whichever_bucket_holds_it() {
    let pm = PlacementMap::new();
    let policy = crate::policy::SimplePolicy::new();
    pm.inner.write().by_instance.insert(iid("a"), BTreeSet::new());
    let gid = global_ids(&["g1"]).remove(0);
    pm.map(&policy, ImageSpec::unassigned(gid.clone())).unwrap();

    assert!(pm.unmap(&gid));
    assert_eq!(pm.lookup(&gid), None);
    assert!(!pm.unmap(&gid));
}

#[test]
fn remap_moves_between_buckets_and_noops_on_equal_instances() {
    let pm = PlacementMap::new();
    pm.inner.write().by_instance.insert(iid("a"), BTreeSet::new());
    pm.inner.write().by_instance.insert(iid("b"), BTreeSet::new());
    let gid = global_ids(&["g1"]).remove(0);
    pm.inner
        .write()
        .by_instance
        .get_mut(&iid("a"))
        .unwrap()
        .insert(ImageSpec::unassigned(gid.clone()));

    assert!(pm.remap(&iid("a"), &iid("a"), &gid));
    assert_eq!(pm.lookup(&gid), Some(iid("a")));

    assert!(pm.remap(&iid("a"), &iid("b"), &gid));
    assert_eq!(pm.lookup(&gid), Some(iid("b")));

    assert!(!pm.remap(&iid("a"), &iid("b"), &gid));
}

#[test]
fn lookup_or_map_is_idempotent() {
    let pm = PlacementMap::new();
    let policy = crate::policy::SimplePolicy::new();
    pm.inner.write().by_instance.insert(iid("a"), BTreeSet::new());
    let gid = global_ids(&["g1"]).remove(0);

    let first = pm.lookup_or_map(&policy, &gid).unwrap();
    let second = pm.lookup_or_map(&policy, &gid).unwrap();
    assert_eq!(first, second);
    assert_eq!(pm.size(), 1);
}

#[test]
fn shuffle_removed_empties_and_erases_departing_bucket() {
    let pm = PlacementMap::new();
    pm.inner.write().by_instance.insert(iid("a"), BTreeSet::new());
    pm.inner.write().by_instance.insert(iid("b"), BTreeSet::new());
    let policy = crate::policy::SimplePolicy::new();
    for g in ["g1", "g2"] {
        let gid = global_ids(&[g]).remove(0);
        pm.inner
            .write()
            .by_instance
            .get_mut(&iid("a"))
            .unwrap()
            .insert(ImageSpec::unassigned(gid));
    }

    pm.shuffle(&policy, &[iid("a")], ShuffleKind::Removed).unwrap();

    assert_eq!(pm.get_instance_ids(), vec![iid("b")]);
    assert_eq!(pm.instance_size(&iid("b")), 2);
}

#[tokio::test]
async fn load_pre_creates_buckets_and_drops_stale_owners() {
    let gw = InMemoryGateway::new();
    let scope = "image-map";
    let kept = mapped("a");
    let stale = mapped("ghost");
    gw.write_if(
        &format!("{scope}/g1"),
        immap_store::codec::encode_image_map(&kept),
        Precondition::None,
    )
    .await
    .unwrap();
    gw.write_if(
        &format!("{scope}/g2"),
        immap_store::codec::encode_image_map(&stale),
        Precondition::None,
    )
    .await
    .unwrap();

    let pm = PlacementMap::new();
    pm.load(&gw, scope, &[iid("a")], 1024).await.unwrap();

    assert_eq!(pm.get_instance_ids(), vec![iid("a")]);
    assert_eq!(pm.size(), 1);
    assert_eq!(pm.lookup(&global_ids(&["g1"]).remove(0)), Some(iid("a")));
    assert_eq!(pm.lookup(&global_ids(&["g2"]).remove(0)), None);
}

#[tokio::test]
async fn load_paginates_across_multiple_pages() {
    let gw = InMemoryGateway::new();
    let scope = "image-map";
    for i in 0..5 {
        gw.write_if(
            &format!("{scope}/g{i}"),
            immap_store::codec::encode_image_map(&mapped("a")),
            Precondition::None,
        )
        .await
        .unwrap();
    }

    let pm = PlacementMap::new();
    pm.load(&gw, scope, &[iid("a")], 2).await.unwrap();
    assert_eq!(pm.size(), 5);
}
