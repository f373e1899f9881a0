//! Many callers, one in-flight operation per key.
//!
//! The first [`QueryCoalescer::submit`] for a key spawns the producer; later
//! submits for the same key only register a waiter. When the producer
//! finishes every waiter gets a clone of the result. Dropping a [`Waiter`]
//! does not cancel the producer.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

type Pending<K, V> = Arc<Mutex<HashMap<K, Vec<oneshot::Sender<V>>>>>;

pub struct QueryCoalescer<K, V> {
    pending: Pending<K, V>,
}

impl<K, V> Clone for QueryCoalescer<K, V> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<K, V> Default for QueryCoalescer<K, V> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> QueryCoalescer<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight operation for `key`, or start `producer` if there
    /// is none. `producer` is not called when joining.
    pub fn submit<F, Fut>(&self, key: K, producer: F) -> Waiter<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let is_first = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.entry(key.clone()) {
                Entry::Occupied(mut waiters) => {
                    waiters.get_mut().push(tx);
                    false
                }
                Entry::Vacant(slot) => {
                    slot.insert(vec![tx]);
                    true
                }
            }
        };

        if is_first {
            let operation = producer();
            let pending = Arc::clone(&self.pending);
            tokio::spawn(async move {
                let value = operation.await;
                let waiters = pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&key)
                    .unwrap_or_default();
                for waiter in waiters {
                    let _ = waiter.send(value.clone());
                }
            });
        } else {
            tracing::debug!(?key, "Joined in-flight query");
        }

        Waiter { rx }
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

/// Receiving end of a coalesced query.
pub struct Waiter<V> {
    rx: oneshot::Receiver<V>,
}

impl<V> Waiter<V> {
    /// `None` if the producer panicked.
    pub async fn wait(self) -> Option<V> {
        self.rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_producer() {
        let coalescer: QueryCoalescer<&'static str, u32> = QueryCoalescer::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let waiters: Vec<_> = (0..5)
            .map(|_| {
                let runs = Arc::clone(&runs);
                coalescer.submit("k", move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    42
                })
            })
            .collect();

        assert!(coalescer.is_in_flight(&"k"));
        for waiter in waiters {
            assert_eq!(waiter.wait().await, Some(42));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!coalescer.is_in_flight(&"k"));
    }

    #[tokio::test]
    async fn test_distinct_keys_run_separately() {
        let coalescer: QueryCoalescer<u32, u32> = QueryCoalescer::new();
        let a = coalescer.submit(1, || async { 10 });
        let b = coalescer.submit(2, || async { 20 });
        assert_eq!(a.wait().await, Some(10));
        assert_eq!(b.wait().await, Some(20));
    }

    #[tokio::test]
    async fn test_dropped_waiter_does_not_cancel() {
        let coalescer: QueryCoalescer<u32, u32> = QueryCoalescer::new();
        let done = Arc::new(AtomicUsize::new(0));

        let flag = Arc::clone(&done);
        drop(coalescer.submit(1, move || async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.fetch_add(1, Ordering::SeqCst);
            1
        }));
        let second = coalescer.submit(1, || async { 2 });

        assert_eq!(second.wait().await, Some(1));
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
