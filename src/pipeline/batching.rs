//! Batch scheduling -- split work into groups of at most `batch_size` and run
//! each group concurrently, waiting for every member to settle before the next.

use std::future::Future;

/// Split `items` into consecutive batches of at most `batch_size`, preserving order.
///
/// A `batch_size` of 0 is treated as 1.
pub(crate) fn split_batches<T>(items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(batch_size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(batch_size).collect());
    }
    batches
}

/// Run `worker` for every item of one batch concurrently and wait for all of them.
///
/// Outcomes come back in batch order. Workers report failure through their
/// output value, so one failing item never cancels its siblings.
pub(crate) async fn run_batch<T, O, F, Fut>(batch: Vec<T>, worker: F) -> Vec<O>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = O>,
{
    futures::future::join_all(batch.into_iter().map(worker)).await
}

/// Process `items` in consecutive batches of at most `batch_size`.
///
/// Within a batch every `worker` invocation runs concurrently; batch N+1 does
/// not start until every invocation of batch N has settled. At most
/// `batch_size` invocations are ever in flight. Returns all outcomes in input
/// order.
///
/// # Example
///
/// ```
/// use repo_dl::pipeline::for_each_batched;
///
/// # async fn example() {
/// let doubled = for_each_batched(vec![1, 2, 3], 2, |n| async move { n * 2 }).await;
/// assert_eq!(doubled, vec![2, 4, 6]);
/// # }
/// ```
pub async fn for_each_batched<T, O, F, Fut>(items: Vec<T>, batch_size: usize, mut worker: F) -> Vec<O>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = O>,
{
    let mut outcomes = Vec::with_capacity(items.len());
    for (index, batch) in split_batches(items, batch_size).into_iter().enumerate() {
        tracing::trace!(batch = index + 1, size = batch.len(), "Starting batch");
        outcomes.extend(run_batch(batch, &mut worker).await);
    }
    outcomes
}
