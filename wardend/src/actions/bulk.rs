// ABOUTME: lifts a single-item file operation into a parallel fan-out with
// ABOUTME: per-index accounting; partial failure is not a batch-level failure.

use std::future::Future;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use warden_common::{BulkItemOutcome, BulkSummary};

use crate::error::OpError;

/// Runs every item concurrently and gathers one outcome per input index.
/// Items do not share mutable state; the filesystem is the source of truth.
pub async fn run_bulk<T, R, F, Fut>(
    items: Vec<T>,
    file_of: fn(&T) -> &str,
    run: F,
) -> BulkSummary
where
    R: Serialize,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, OpError>>,
{
    let started = Instant::now();

    let tasks = items.into_iter().enumerate().map(|(index, item)| {
        let file = file_of(&item).to_string();
        let fut = run(item);
        async move {
            match fut.await {
                Ok(result) => BulkItemOutcome {
                    index,
                    file,
                    success: true,
                    result: serde_json::to_value(&result).ok(),
                    error: None,
                    kind: None,
                },
                Err(err) => BulkItemOutcome {
                    index,
                    file,
                    success: false,
                    result: None,
                    error: Some(err.to_string()),
                    kind: Some(err.kind()),
                },
            }
        }
    });

    let results = join_all(tasks).await;
    let errors: Vec<BulkItemOutcome> = results.iter().filter(|r| !r.success).cloned().collect();
    let success_count = results.len() - errors.len();

    BulkSummary {
        total_files: results.len(),
        success_count,
        error_count: errors.len(),
        execution_time_ms: started.elapsed().as_millis() as u64,
        results,
        errors,
    }
}
