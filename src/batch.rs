//! Bounded-parallel execution of per-plugin work.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use crate::error::{AggregateError, HostError, Result};

/// Run `work` once per item, at most `permits` at a time.
///
/// Every item gets its own task. A failing item never stops the others;
/// all failures are returned together once every task has finished.
pub async fn run_bounded<T, F, Fut>(items: Vec<T>, permits: usize, work: F) -> Result<()>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(permits.max(1)));
    let errors = Arc::new(Mutex::new(AggregateError::new()));
    let work = Arc::new(work);

    let mut tasks = Vec::with_capacity(items.len());
    for item in items {
        let semaphore = semaphore.clone();
        let errors = errors.clone();
        let work = work.clone();

        tasks.push(tokio::spawn(async move {
            // The semaphore is never closed
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            if let Err(e) = (*work)(item).await {
                errors.lock().await.push(e);
            }
        }));
    }

    for task in tasks {
        if let Err(e) = task.await {
            errors.lock().await.push(HostError::TaskFailed(e.to_string()));
        }
    }

    let errors = std::mem::take(&mut *errors.lock().await);
    errors.into_result()
}
