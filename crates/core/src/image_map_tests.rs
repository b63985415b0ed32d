// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn wire_byte_round_trips_for_every_state() {
    for state in
        [ImageMapState::Unassigned, ImageMapState::Mapping, ImageMapState::Mapped, ImageMapState::Unmapping]
    {
        let byte = state.as_wire_byte();
        assert_eq!(ImageMapState::from_wire_byte(byte), Some(state));
    }
}

#[test]
fn unknown_wire_byte_is_rejected() {
    assert_eq!(ImageMapState::from_wire_byte(4), None);
    assert_eq!(ImageMapState::from_wire_byte(255), None);
}

#[test]
fn image_spec_identity_is_global_id_only() {
    let mut a = ImageSpec::unassigned(GlobalId::new("g1"));
    a.local_id = Some("local-a".into());
    let mut b = ImageSpec::unassigned(GlobalId::new("g1"));
    b.local_id = Some("local-b".into());
    assert_eq!(a, b, "local_id must not affect ImageSpec identity");

    let c = ImageSpec::unassigned(GlobalId::new("g2"));
    assert_ne!(a, c);
}

#[test]
fn image_spec_ordering_follows_global_id() {
    let a = ImageSpec::unassigned(GlobalId::new("g1"));
    let b = ImageSpec::unassigned(GlobalId::new("g2"));
    assert!(a < b);
}

#[test]
fn display_matches_snake_case_names() {
    assert_eq!(ImageMapState::Mapped.to_string(), "mapped");
    assert_eq!(ImageMapState::Unmapping.to_string(), "unmapping");
}
