// SPDX-License-Identifier: MIT

//! Engine-wide error taxonomy (spec §7).

use thiserror::Error;

/// Errors surfaced by the placement engine's public operations.
///
/// `Transient` and `Canceled` originate below the orchestrator (object
/// store, peer RPCs) and are retried or drained by the layer that sees
/// them first; by the time they reach a caller of `PlacementOrchestrator`
/// they represent an exhausted retry budget or a shutdown in progress.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A durable write precondition failed, or the object was not found
    /// where the caller expected it.
    #[error("object store conflict: {0}")]
    Conflict(String),

    /// The object store retried a transient failure past its ceiling.
    #[error("object store transient error: {0}")]
    Transient(String),

    /// The durable state contradicts an in-memory invariant (e.g. the
    /// `instance_id` read back is neither `from` nor `to`). Maps to the
    /// source's `-EINVAL`.
    #[error("inconsistent placement state for {global_id}: {detail}")]
    Invalid { global_id: String, detail: String },

    /// A policy invariant that should be unreachable was violated.
    #[error("policy assertion failed: {0}")]
    PolicyViolation(String),

    /// The engine is shutting down; pending work was aborted.
    #[error("canceled during shutdown")]
    Canceled,
}

impl EngineError {
    pub fn invalid(global_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Invalid { global_id: global_id.into(), detail: detail.into() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
