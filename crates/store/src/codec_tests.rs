// SPDX-License-Identifier: MIT

use super::*;
use immap_core::test_support::mapped;

#[test]
fn round_trips_every_state() {
    for state in [
        ImageMapState::Unassigned,
        ImageMapState::Mapping,
        ImageMapState::Mapped,
        ImageMapState::Unmapping,
    ] {
        let record = ImageMap::new(InstanceId::new("inst-a"), state, 42);
        let bytes = encode_image_map(&record);
        let decoded = decode_image_map(&bytes).expect("decodes");
        assert_eq!(decoded, record);
    }
}

#[test]
fn round_trips_test_support_helper() {
    let record = mapped("inst-a");
    let bytes = encode_image_map(&record);
    assert_eq!(decode_image_map(&bytes).unwrap(), record);
}

#[test]
fn rejects_unknown_version() {
    let mut bytes = encode_image_map(&mapped("x"));
    bytes[0] = 9;
    assert!(matches!(decode_image_map(&bytes), Err(StoreError::Corrupt(_))));
}

#[test]
fn rejects_unknown_state_byte() {
    let mut bytes = encode_image_map(&mapped("x"));
    let state_idx = 1 + 4 + "x".len();
    bytes[state_idx] = 200;
    assert!(matches!(decode_image_map(&bytes), Err(StoreError::Corrupt(_))));
}

#[test]
fn rejects_truncated_record() {
    let bytes = encode_image_map(&mapped("inst-a"));
    assert!(matches!(decode_image_map(&bytes[..3]), Err(StoreError::Corrupt(_))));
}

#[test]
fn rejects_trailing_bytes() {
    let mut bytes = encode_image_map(&mapped("inst-a"));
    bytes.push(0);
    assert!(matches!(decode_image_map(&bytes), Err(StoreError::Corrupt(_))));
}
