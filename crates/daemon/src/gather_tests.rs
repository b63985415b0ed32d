// SPDX-License-Identifier: MIT

use super::*;

#[tokio::test]
async fn first_error_wins_runs_all_siblings_despite_one_failure() {
    let calls = std::sync::Arc::new(tokio::sync::Mutex::new(0u32));
    let mut tasks: Vec<_> = Vec::new();
    for i in 0..3u32 {
        let calls = calls.clone();
        tasks.push(async move {
            *calls.lock().await += 1;
            if i == 1 {
                Err(EngineError::Canceled)
            } else {
                Ok(())
            }
        });
    }
    let result = first_error_wins(tasks).await;
    assert!(result.is_err());
    assert_eq!(*calls.lock().await, 3);
}

#[tokio::test]
async fn first_error_wins_ok_when_all_succeed() {
    let tasks: Vec<_> = (0..3).map(|_| async { Ok(()) }).collect();
    assert!(first_error_wins(tasks).await.is_ok());
}

#[tokio::test]
async fn all_success_required_reports_every_failure_index() {
    let tasks: Vec<_> = vec![
        Box::pin(async { Ok(()) }) as std::pin::Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send>>,
        Box::pin(async { Err(EngineError::Canceled) }),
        Box::pin(async { Err(EngineError::Canceled) }),
    ];
    let mut failed_indices = Vec::new();
    let ok = all_success_required(tasks, |idx, _| failed_indices.push(idx)).await;
    assert!(!ok);
    failed_indices.sort();
    assert_eq!(failed_indices, vec![1, 2]);
}
