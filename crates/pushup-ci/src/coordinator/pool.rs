//! Bounded fan-out over owned inputs.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::domain::error::{CiError, Result};

/// Run `f` over `items` with at most `limit` in flight. Outputs keep the
/// input order. A panicking task resumes its panic here.
pub(crate) async fn map_bounded<I, T, F, Fut>(items: Vec<I>, limit: usize, f: F) -> Result<Vec<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let len = items.len();
    let f = Arc::new(f);
    let sem = Arc::new(Semaphore::new(limit.max(1)));

    let mut join_set = JoinSet::new();
    for (idx, item) in items.into_iter().enumerate() {
        let f = Arc::clone(&f);
        let sem = Arc::clone(&sem);
        join_set.spawn(async move {
            let _permit = sem.acquire_owned().await.ok();
            (idx, f(item).await)
        });
    }

    let mut ordered: Vec<Option<T>> = (0..len).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, value)) => ordered[idx] = Some(value),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => return Err(CiError::Monorepo(format!("project task join error: {e}"))),
        }
    }

    ordered
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.ok_or_else(|| CiError::Monorepo(format!("missing result for task {idx}")))
        })
        .collect()
}
