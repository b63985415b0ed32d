// SPDX-License-Identifier: MIT

//! Engine configuration (spec §6 "Configuration").

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pluggable rebalancing policy selector.
///
/// Only `Simple` exists today; the enum exists so a future policy can be
/// added without changing `Config`'s shape or the `Policy` trait's
/// callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyName {
    Simple,
}

impl Default for PolicyName {
    fn default() -> Self {
        PolicyName::Simple
    }
}

/// Engine-wide configuration, all values positive unless noted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between expected peer heartbeats.
    pub heartbeat_interval_secs: u64,
    /// Missed heartbeats tolerated before a peer is considered silent.
    pub max_missed_heartbeats: u64,
    /// Acquire retries tolerated before the engine gives up on a peer
    /// and lets the leader-election/heartbeat mechanism break its lock.
    pub max_acquire_attempts_before_break: u64,
    pub policy_name: PolicyName,
    /// Page size for `OSG::list_range` during durable-map enumeration.
    pub list_page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 5,
            max_missed_heartbeats: 2,
            max_acquire_attempts_before_break: 3,
            policy_name: PolicyName::Simple,
            list_page_size: 1024,
        }
    }
}

impl Config {
    /// The grace period a peer's removal timer waits for a refreshing
    /// notification, per spec §4.2:
    /// `max(1, heartbeat_interval) * (1 + max_missed_heartbeats + max_acquire_attempts_before_break)`.
    pub fn removal_grace(&self) -> Duration {
        let interval = self.heartbeat_interval_secs.max(1);
        let factor = 1 + self.max_missed_heartbeats + self.max_acquire_attempts_before_break;
        Duration::from_secs(interval * factor)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
