// SPDX-License-Identifier: MIT

use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

#[tokio::test(start_paused = true)]
async fn succeeds_after_transient_failures() {
    let attempts = AtomicU32::new(0);
    let result = retry_with_backoff(
        || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StoreError::Transient("not yet".into()))
                } else {
                    Ok(42)
                }
            }
        },
        5,
    )
    .await;
    assert_eq!(result.unwrap(), 42);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let attempts = AtomicU32::new(0);
    let result: Result<(), StoreError> = retry_with_backoff(
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Transient("still broken".into())) }
        },
        3,
    )
    .await;
    assert!(matches!(result, Err(StoreError::Transient(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn non_transient_errors_are_not_retried() {
    let attempts = AtomicU32::new(0);
    let result: Result<(), StoreError> = retry_with_backoff(
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Conflict) }
        },
        5,
    )
    .await;
    assert_eq!(result.unwrap_err(), StoreError::Conflict);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
