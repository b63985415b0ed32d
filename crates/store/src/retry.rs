// SPDX-License-Identifier: MIT

//! Exponential backoff for `StoreError::Transient` failures.
//!
//! Every other error is returned to the caller immediately; retrying a
//! `Conflict` or `NotFound` is the caller's decision, made with
//! knowledge the generic retry loop here doesn't have.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::gateway::StoreError;

const BASE_DELAY: Duration = Duration::from_millis(50);
const MAX_DELAY: Duration = Duration::from_secs(5);

/// Runs `op` until it succeeds, returns a non-transient error, or
/// `max_attempts` transient failures have been observed.
pub async fn retry_with_backoff<F, Fut, T>(
    mut op: F,
    max_attempts: u32,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < max_attempts => {
                let delay = backoff_delay(attempt);
                debug!(attempt, ?delay, %err, "retrying transient store error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    BASE_DELAY.saturating_mul(1 << attempt.min(10)).min(MAX_DELAY)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
