//! Bounded-concurrency fan-out for per-partition remote I/O.

use futures::stream::{self, StreamExt};
use std::future::Future;

use crate::error::SyncResult;

/// Outcome of one item of a [`parallel_map`] call.
#[derive(Debug)]
pub struct Settled<I, T> {
    pub item: I,
    pub result: SyncResult<T>,
}

/// Run `f` over `items` with at most `limit` futures in flight.
///
/// Every item settles: a failure is reported in its slot and never cancels
/// the others. Results come back in input order. A `limit` of zero is
/// treated as one.
pub async fn parallel_map<I, T, F, Fut>(items: Vec<I>, limit: usize, f: F) -> Vec<Settled<I, T>>
where
    I: Clone,
    F: Fn(I) -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let limit = limit.max(1);
    stream::iter(items.into_iter().map(|item| {
        let fut = f(item.clone());
        async move {
            Settled {
                item,
                result: fut.await,
            }
        }
    }))
    .buffered(limit)
    .collect()
    .await
}
