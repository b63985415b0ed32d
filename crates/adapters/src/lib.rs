// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! immap-adapters: the `ReplicaAdapter` contract (spec §6 "Peer RPCs").
//!
//! The replication workers that actually acquire/release an image on a
//! peer daemon are out of scope (spec §1); this crate only defines the
//! boundary the placement orchestrator calls across.

pub mod error;
pub mod replica;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use error::RpcError;
pub use replica::ReplicaAdapter;

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeReplicaAdapter;
