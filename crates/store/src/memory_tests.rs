// SPDX-License-Identifier: MIT

use super::*;

#[tokio::test]
async fn read_missing_key_is_not_found() {
    let gw = InMemoryGateway::new();
    assert_eq!(gw.read("k").await.unwrap_err(), StoreError::NotFound);
}

#[tokio::test]
async fn write_if_absent_then_exists_round_trip() {
    let gw = InMemoryGateway::new();
    gw.write_if("k", b"v1".to_vec(), Precondition::Absent).await.unwrap();
    assert_eq!(gw.read("k").await.unwrap(), b"v1");

    let err = gw.write_if("k", b"v2".to_vec(), Precondition::Absent).await.unwrap_err();
    assert_eq!(err, StoreError::Conflict);

    gw.write_if("k", b"v2".to_vec(), Precondition::Exists).await.unwrap();
    assert_eq!(gw.read("k").await.unwrap(), b"v2");
}

#[tokio::test]
async fn write_if_version_mismatch_conflicts() {
    let gw = InMemoryGateway::new();
    gw.write_if("k", b"v1".to_vec(), Precondition::None).await.unwrap();
    let err = gw.write_if("k", b"v2".to_vec(), Precondition::Version(99)).await.unwrap_err();
    assert_eq!(err, StoreError::Conflict);
    gw.write_if("k", b"v2".to_vec(), Precondition::Version(1)).await.unwrap();
}

#[tokio::test]
async fn remove_absent_key_is_ok() {
    let gw = InMemoryGateway::new();
    gw.remove("missing").await.unwrap();
}

#[tokio::test]
async fn list_range_paginates_in_key_order() {
    let gw = InMemoryGateway::new();
    for k in ["a/1", "a/2", "a/3", "b/1"] {
        gw.write_if(k, k.as_bytes().to_vec(), Precondition::None).await.unwrap();
    }
    let (page, has_more) = gw.list_range("a/", None, 2).await.unwrap();
    assert_eq!(page.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), vec!["a/1", "a/2"]);
    assert!(has_more);

    let (page2, has_more2) = gw.list_range("a/", Some("a/2"), 2).await.unwrap();
    assert_eq!(page2.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), vec!["a/3"]);
    assert!(!has_more2);
}

#[tokio::test]
async fn watch_receives_notify_payloads() {
    let gw = InMemoryGateway::new();
    let mut watch = gw.watch("topic").await.unwrap();
    gw.notify("topic", b"hello".to_vec()).await.unwrap();
    let payload = watch.rx.recv().await.unwrap();
    assert_eq!(payload, b"hello");
}

#[tokio::test]
async fn unwatch_stops_delivery() {
    let gw = InMemoryGateway::new();
    let watch = gw.watch("topic").await.unwrap();
    gw.unwatch("topic", watch.id).await.unwrap();
    gw.notify("topic", b"hello".to_vec()).await.unwrap();
    drop(watch);
}

#[tokio::test]
async fn register_client_conflict_then_unregister_allows_rejoin() {
    let gw = InMemoryGateway::new();
    gw.register_client("instances", "i1", b"meta".to_vec()).await.unwrap();
    let err = gw.register_client("instances", "i1", b"meta2".to_vec()).await.unwrap_err();
    assert_eq!(err, StoreError::Conflict);

    gw.unregister_client("instances", "i1").await.unwrap();
    gw.register_client("instances", "i1", b"meta2".to_vec()).await.unwrap();
}
