// SPDX-License-Identifier: MIT

//! Daemon-level error taxonomy (spec §7), wrapping the lower crates'
//! errors plus the cases only the orchestrator can detect: durable
//! state that contradicts an in-memory invariant, and policy
//! assertions that should be unreachable.

use immap_adapters::RpcError;
use immap_core::EngineError as CoreError;
use immap_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("object store: {0}")]
    Store(#[from] StoreError),
    #[error("peer rpc: {0}")]
    Rpc(#[from] RpcError),
    #[error("map inconsistency for {global_id}: {detail}")]
    Invalid { global_id: String, detail: String },
    #[error("policy assertion failed: {0}")]
    PolicyViolation(String),
    #[error("shutting down")]
    Canceled,
}

impl EngineError {
    pub fn invalid(global_id: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineError::Invalid { global_id: global_id.into(), detail: detail.into() }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Conflict(_) => EngineError::Store(StoreError::Conflict),
            CoreError::Transient(detail) => EngineError::Store(StoreError::Transient(detail)),
            CoreError::Invalid { global_id, detail } => EngineError::invalid(global_id, detail),
            CoreError::PolicyViolation(detail) => EngineError::PolicyViolation(detail),
            CoreError::Canceled => EngineError::Canceled,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
