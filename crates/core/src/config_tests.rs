// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn default_removal_grace_matches_spec_formula() {
    let config = Config::default();
    // 5 * (1 + 2 + 3) = 30
    assert_eq!(config.removal_grace(), Duration::from_secs(30));
}

#[test]
fn zero_heartbeat_interval_floors_to_one_second() {
    let config = Config { heartbeat_interval_secs: 0, ..Config::default() };
    // max(1, 0) * (1 + 2 + 3) = 6
    assert_eq!(config.removal_grace(), Duration::from_secs(6));
}

#[test]
fn default_policy_is_simple() {
    assert_eq!(Config::default().policy_name, PolicyName::Simple);
}
