//! Fan-out of CPU-bound per-session work onto the blocking pool

use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};

/// Splits `items` into chunks of `chunk_size`, runs `work` on each chunk in a
/// `spawn_blocking` task and returns the per-chunk results in input order.
///
/// Dropping the returned future (e.g. the client disconnected) drops the
/// `JoinSet`, which aborts every chunk that has not started yet.
pub async fn fan_out<T, R, F>(
    items: Vec<T>,
    chunk_size: usize,
    work: F,
) -> Result<Vec<R>, JoinError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(Vec<T>) -> R + Send + Sync + 'static,
{
    let chunk_size = chunk_size.max(1);
    let work = Arc::new(work);
    let mut set = JoinSet::new();
    let mut items = items.into_iter().peekable();
    let mut chunks = 0usize;

    while items.peek().is_some() {
        let chunk: Vec<T> = items.by_ref().take(chunk_size).collect();
        let work = Arc::clone(&work);
        let position = chunks;
        set.spawn_blocking(move || (position, work(chunk)));
        chunks += 1;
    }

    let mut partials = Vec::with_capacity(chunks);
    while let Some(joined) = set.join_next().await {
        partials.push(joined?);
    }
    partials.sort_by_key(|(position, _)| *position);

    Ok(partials.into_iter().map(|(_, result)| result).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_preserves_chunk_order() {
        let items: Vec<u32> = (1..=10).collect();
        let sums = fan_out(items, 3, |chunk| chunk.iter().sum::<u32>())
            .await
            .unwrap();

        assert_eq!(sums, vec![6, 15, 24, 10]);
    }

    #[tokio::test]
    async fn test_fan_out_empty_input() {
        let results = fan_out(Vec::<u32>::new(), 8, |chunk| chunk.len())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_zero_chunk_size_is_clamped() {
        let results = fan_out(vec![1, 2], 0, |chunk| chunk.len()).await.unwrap();
        assert_eq!(results, vec![1, 1]);
    }
}
