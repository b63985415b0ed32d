// SPDX-License-Identifier: MIT

//! Peer-RPC error taxonomy (spec §7): `NotFound`/`InvalidArg` are benign
//! from the orchestrator's point of view — the peer is absent or already
//! in the state the call was trying to reach — while `Io` indicates the
//! call genuinely failed to land.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("peer rpc: instance not found")]
    NotFound,
    #[error("peer rpc: invalid argument")]
    InvalidArg,
    #[error("peer rpc: io error: {0}")]
    Io(String),
}

impl RpcError {
    /// True for outcomes the per-image state machine treats as success:
    /// the peer is gone or already where the call wanted it.
    pub fn is_benign(&self) -> bool {
        matches!(self, RpcError::NotFound | RpcError::InvalidArg)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
