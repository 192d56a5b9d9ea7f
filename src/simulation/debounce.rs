//! Keyed debounce for simulation requests
//!
//! A request waits out a quiet period before running. A newer request for
//! the same key cancels the older one, whether it is still waiting or
//! already running, and the older caller gets `None` back.

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Pending {
    generation: u64,
    token: CancellationToken,
}

pub struct Debouncer {
    delay: Duration,
    pending: DashMap<String, Pending>,
    /// Serializes execution per key so a superseded run never overlaps its successor
    gates: DashMap<String, Arc<Mutex<()>>>,
    next: AtomicU64,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: DashMap::new(),
            gates: DashMap::new(),
            next: AtomicU64::new(0),
        }
    }

    /// Run `job` for `key` once the quiet period passes.
    ///
    /// Returns `None` when a later call for the same key superseded this one.
    pub async fn run<F, Fut, T>(&self, key: &str, job: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let generation = self.next.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();

        if let Some(previous) = self.pending.insert(
            key.to_string(),
            Pending {
                generation,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }

        // declared first so it drops last, after the gate below
        let _cleanup = Cleanup {
            debouncer: self,
            key,
            generation,
        };

        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {}
            _ = token.cancelled() => {
                debug!("Debounced request for {} superseded while waiting", key);
                return None;
            }
        }

        let gate = self
            .gates
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _turn = gate.lock().await;

        if token.is_cancelled() {
            return None;
        }

        let output = job().await;

        // finished, but a newer request arrived meanwhile: discard
        if token.is_cancelled() {
            debug!("Debounced result for {} discarded", key);
            return None;
        }
        Some(output)
    }

    /// Cancel whatever is pending for `key`
    pub fn cancel(&self, key: &str) {
        if let Some((_, pending)) = self.pending.remove(key) {
            pending.token.cancel();
        }
    }

    /// Number of keys with a request waiting or running
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    fn gate_count(&self) -> usize {
        self.gates.len()
    }
}

/// Releases a request's bookkeeping when it finishes or its caller drops it
struct Cleanup<'a> {
    debouncer: &'a Debouncer,
    key: &'a str,
    generation: u64,
}

impl Drop for Cleanup<'_> {
    fn drop(&mut self) {
        let generation = self.generation;
        self.debouncer
            .pending
            .remove_if(self.key, |_, p| p.generation == generation);
        // the map's own handle is the last one once nobody waits on the gate
        self.debouncer
            .gates
            .remove_if(self.key, |_, gate| Arc::strong_count(gate) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_single_request_runs_after_delay() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let start = tokio::time::Instant::now();

        let result = debouncer.run("node-1", || async { 7 }).await;

        assert_eq!(result, Some(7));
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_request_supersedes_older() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(500)));
        let runs = Arc::new(AtomicUsize::new(0));

        let first = {
            let debouncer = debouncer.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                debouncer
                    .run("node-1", || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        "first"
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;

        let second = {
            let runs = runs.clone();
            debouncer
                .run("node-1", || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    "second"
                })
                .await
        };

        assert_eq!(first.await.unwrap(), None);
        assert_eq!(second, Some("second"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_is_discarded() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(100)));

        let slow = {
            let debouncer = debouncer.clone();
            tokio::spawn(async move {
                debouncer
                    .run("node-1", || async {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                        "stale"
                    })
                    .await
            })
        };

        // let the first request get past its quiet period and start running
        tokio::time::sleep(Duration::from_millis(300)).await;

        let fresh = debouncer.run("node-1", || async { "fresh" }).await;

        assert_eq!(slow.await.unwrap(), None);
        assert_eq!(fresh, Some("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(500)));

        let a = {
            let debouncer = debouncer.clone();
            tokio::spawn(async move { debouncer.run("a", || async { 1 }).await })
        };
        let b = debouncer.run("b", || async { 2 }).await;

        assert_eq!(a.await.unwrap(), Some(1));
        assert_eq!(b, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(500)));

        let handle = {
            let debouncer = debouncer.clone();
            tokio::spawn(async move { debouncer.run("node-1", || async { 1 }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        debouncer.cancel("node-1");

        assert_eq!(handle.await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bookkeeping_is_released_after_runs() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(100)));

        let first = {
            let debouncer = debouncer.clone();
            tokio::spawn(async move { debouncer.run("node-1", || async { 1 }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = debouncer.run("node-1", || async { 2 }).await;
        let other = debouncer.run("node-2", || async { 3 }).await;

        assert_eq!(first.await.unwrap(), None);
        assert_eq!((second, other), (Some(2), Some(3)));
        assert_eq!(debouncer.pending_count(), 0);
        assert_eq!(debouncer.gate_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_releases_bookkeeping() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(100)));

        // caller goes away while waiting out the quiet period
        let waiting = {
            let debouncer = debouncer.clone();
            tokio::spawn(async move { debouncer.run("node-1", || async { 1 }).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(debouncer.pending_count(), 1);
        waiting.abort();
        assert!(waiting.await.unwrap_err().is_cancelled());

        // caller goes away while its job holds the gate
        let running = {
            let debouncer = debouncer.clone();
            tokio::spawn(async move {
                debouncer
                    .run("node-2", || tokio::time::sleep(Duration::from_secs(5)))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(debouncer.gate_count(), 1);
        running.abort();
        assert!(running.await.unwrap_err().is_cancelled());

        assert_eq!(debouncer.pending_count(), 0);
        assert_eq!(debouncer.gate_count(), 0);
    }
}
