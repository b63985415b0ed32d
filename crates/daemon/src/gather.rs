// SPDX-License-Identifier: MIT

//! Fan-out completion primitives (spec §4.4.2, §9): the orchestrator
//! needs exactly two shapes of "wait for every child, then report a
//! single aggregate" — first-error-wins for the shuffle driver, and
//! all-success-required (with a per-failure callback) for the
//! peer-uuid fan-out.
//!
//! Each child runs as its own tokio task so siblings make progress
//! concurrently; the gate only releases once every task has returned.
//! A child that panics does not take the process down (the workspace
//! runs with `panic = "abort"`, so that would kill `immapd` entirely):
//! a genuine panic is re-raised via `resume_unwind` once every sibling
//! has finished, but a join cancellation (the only other way
//! `JoinError` is produced here — nothing calls `abort()` on these
//! tasks today, but a future shutdown path might) is folded into
//! `EngineError::Canceled` like any other sibling failure.

use std::collections::HashMap;
use std::future::Future;
use std::panic;

use tokio::task::{Id, JoinError, JoinSet};

use crate::error::EngineError;

/// Converts a `JoinError` into the `EngineError` it represents, unless
/// it's a panic — panics are re-raised rather than swallowed.
fn join_error_to_engine_error(err: JoinError) -> EngineError {
    match err.try_into_panic() {
        Ok(payload) => panic::resume_unwind(payload),
        Err(err) => {
            debug_assert!(err.is_cancelled());
            EngineError::Canceled
        }
    }
}

/// Runs every future to completion concurrently and returns the first
/// error observed, if any, only after all of them have finished. Used
/// by the shuffle driver: one child's failure must not block its
/// siblings from running, but the shuffle-level reply is only released
/// once every sibling is done.
pub async fn first_error_wins<Fut>(tasks: Vec<Fut>) -> Result<(), EngineError>
where
    Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
{
    let mut join_set = JoinSet::new();
    for task in tasks {
        join_set.spawn(task);
    }

    let mut first_err = None;
    while let Some(outcome) = join_set.join_next().await {
        let result = outcome.map_err(join_error_to_engine_error).and_then(|r| r);
        if let Err(err) = result {
            tracing::warn!(%err, "shuffle sibling task failed");
            if first_err.is_none() {
                first_err = Some(err);
            }
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Runs every future to completion concurrently; `on_failure(index)` is
/// invoked for each one that errors (used to add a peer to the
/// ignore-list). Succeeds only if every task succeeded.
pub async fn all_success_required<Fut>(
    tasks: Vec<Fut>,
    mut on_failure: impl FnMut(usize, &EngineError),
) -> bool
where
    Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
{
    let mut join_set = JoinSet::new();
    let mut idx_by_id: HashMap<Id, usize> = HashMap::new();
    for (idx, task) in tasks.into_iter().enumerate() {
        let handle = join_set.spawn(task);
        idx_by_id.insert(handle.id(), idx);
    }

    let mut all_ok = true;
    while let Some((id, outcome)) = join_set.join_next_with_id().await.map(|r| match r {
        Ok((id, result)) => (id, result),
        Err(err) => {
            let id = err.id();
            (id, Err(join_error_to_engine_error(err)))
        }
    }) {
        if let Err(err) = outcome {
            let idx = idx_by_id[&id];
            on_failure(idx, &err);
            all_ok = false;
        }
    }
    all_ok
}

#[cfg(test)]
#[path = "gather_tests.rs"]
mod tests;
