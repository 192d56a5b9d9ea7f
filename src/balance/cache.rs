//! TTL cache of unified balances with stale-on-error fallback

use super::clock::Clock;
use crate::error::EngineResult;
use crate::sdk::{ChainAbstractionSdk, SdkError, TokenBalance};

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Upstream fetch shared by every caller that arrives while it runs
type Flight = Shared<BoxFuture<'static, Result<BalanceSnapshot, SdkError>>>;

/// Cached fetch for one key
struct CacheEntry {
    data: Vec<TokenBalance>,
    fetched_at: Instant,
    /// Invalidation epoch the fetch started in
    epoch: u64,
}

struct InFlight {
    id: u64,
    epoch: u64,
    fetch: Flight,
}

#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry>,
    in_flight: Option<InFlight>,
}

/// How a snapshot was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Served from cache within the TTL
    Cached,
    /// Fetched from the SDK on this call
    Fetched,
    /// Refresh failed transiently; previous data served
    Stale,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceSnapshot {
    pub balances: Vec<TokenBalance>,
    pub freshness: Freshness,
}

/// Balance cache keyed by `include_swappable`.
///
/// A miss starts one upstream fetch per key and parks it in the slot. Callers
/// arriving before it completes await the same fetch and get the same
/// outcome: fresh data, stale data or the error.
pub struct BalanceCache {
    sdk: Arc<dyn ChainAbstractionSdk>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    slots: DashMap<bool, Arc<Mutex<Slot>>>,
    epoch: Arc<AtomicU64>,
    next_flight: AtomicU64,
}

impl BalanceCache {
    /// Create a new balance cache
    pub fn new(sdk: Arc<dyn ChainAbstractionSdk>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            sdk,
            clock,
            ttl,
            slots: DashMap::new(),
            epoch: Arc::new(AtomicU64::new(0)),
            next_flight: AtomicU64::new(0),
        }
    }

    /// Get balances, fetching only when the cached entry has expired
    pub async fn get_balances(&self, include_swappable: bool) -> EngineResult<Vec<TokenBalance>> {
        self.snapshot(include_swappable).await.map(|s| s.balances)
    }

    /// Get balances along with how they were obtained
    pub async fn snapshot(&self, include_swappable: bool) -> EngineResult<BalanceSnapshot> {
        let slot = self.slot(include_swappable);

        let fetch = {
            let mut state = slot.lock().await;
            let epoch = self.epoch.load(Ordering::SeqCst);

            if let Some(cached) = state.entry.as_ref().filter(|e| e.epoch == epoch) {
                if self.clock.now().saturating_duration_since(cached.fetched_at) < self.ttl {
                    crate::metrics::record_balance_cache_hit(include_swappable);
                    return Ok(BalanceSnapshot {
                        balances: cached.data.clone(),
                        freshness: Freshness::Cached,
                    });
                }
            }

            match state.in_flight.as_ref().filter(|f| f.epoch == epoch) {
                Some(flight) => {
                    debug!("Joining in-flight balance fetch (swappable: {})", include_swappable);
                    flight.fetch.clone()
                }
                None => {
                    crate::metrics::record_balance_cache_miss(include_swappable);
                    let id = self.next_flight.fetch_add(1, Ordering::SeqCst);
                    let fetch = self.start_fetch(slot.clone(), &state, id, epoch, include_swappable);
                    state.in_flight = Some(InFlight {
                        id,
                        epoch,
                        fetch: fetch.clone(),
                    });
                    fetch
                }
            }
        };

        Ok(fetch.await?)
    }

    /// Drop every cached entry, including ones being fetched right now
    pub fn invalidate(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        for slot in self.slots.iter() {
            // busy slots are covered by the epoch bump
            if let Ok(mut state) = slot.value().try_lock() {
                state.entry = None;
            }
        }

        debug!("Balance cache invalidated (epoch {})", epoch);
    }

    /// Build the fetch for one miss. It records its own result in the slot,
    /// so it completes the same way whichever caller ends up driving it.
    fn start_fetch(
        &self,
        slot: Arc<Mutex<Slot>>,
        state: &Slot,
        id: u64,
        epoch: u64,
        include_swappable: bool,
    ) -> Flight {
        let sdk = self.sdk.clone();
        let clock = self.clock.clone();
        let current_epoch = self.epoch.clone();
        let fallback = state
            .entry
            .as_ref()
            .filter(|e| e.epoch == epoch)
            .map(|e| (e.data.clone(), e.fetched_at));

        async move {
            debug!("Fetching balances (swappable: {})", include_swappable);
            let result = sdk.fetch_unified_balances(include_swappable).await;

            let mut state = slot.lock().await;
            if state.in_flight.as_ref().is_some_and(|f| f.id == id) {
                state.in_flight = None;
            }

            match result {
                Ok(data) => {
                    if current_epoch.load(Ordering::SeqCst) == epoch {
                        state.entry = Some(CacheEntry {
                            data: data.clone(),
                            fetched_at: clock.now(),
                            epoch,
                        });
                    }
                    Ok(BalanceSnapshot {
                        balances: data,
                        freshness: Freshness::Fetched,
                    })
                }
                Err(err) => match fallback {
                    Some((data, fetched_at)) if err.is_transient() => {
                        warn!(
                            "Balance refresh failed ({}), serving data from {:?} ago",
                            err,
                            clock.now().saturating_duration_since(fetched_at)
                        );
                        crate::metrics::record_balance_stale_served(include_swappable);
                        Ok(BalanceSnapshot {
                            balances: data,
                            freshness: Freshness::Stale,
                        })
                    }
                    _ => Err(err),
                },
            }
        }
        .boxed()
        .shared()
    }

    fn slot(&self, include_swappable: bool) -> Arc<Mutex<Slot>> {
        self.slots
            .entry(include_swappable)
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::ManualClock;
    use crate::error::EngineError;
    use crate::sdk::{ChainInfo, RouteParams, RouteSimulation, SdkError, SdkErrorCode};

    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Scripted SDK that counts balance fetches
    struct ScriptedSdk {
        calls: AtomicUsize,
        delay: Duration,
        script: std::sync::Mutex<VecDeque<Result<Vec<TokenBalance>, SdkError>>>,
    }

    impl ScriptedSdk {
        fn new(script: Vec<Result<Vec<TokenBalance>, SdkError>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                script: std::sync::Mutex::new(script.into()),
            })
        }

        fn slow(script: Vec<Result<Vec<TokenBalance>, SdkError>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                script: std::sync::Mutex::new(script.into()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChainAbstractionSdk for ScriptedSdk {
        async fn fetch_unified_balances(
            &self,
            _include_swappable: bool,
        ) -> Result<Vec<TokenBalance>, SdkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SdkError::new(SdkErrorCode::Unknown, "script exhausted")))
        }

        async fn simulate_route(
            &self,
            _params: &RouteParams,
        ) -> Result<Option<RouteSimulation>, SdkError> {
            Ok(None)
        }

        async fn list_supported_chains(&self) -> Result<Vec<ChainInfo>, SdkError> {
            Ok(Vec::new())
        }
    }

    fn usdc(amount: &str) -> Vec<TokenBalance> {
        vec![TokenBalance {
            symbol: "USDC".into(),
            balance: amount.into(),
            balance_in_fiat: None,
            breakdown: None,
        }]
    }

    fn network_error() -> SdkError {
        SdkError::from_message("Network request failed")
    }

    fn cache_with(sdk: Arc<ScriptedSdk>) -> (BalanceCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = BalanceCache::new(sdk, clock.clone(), Duration::from_secs(30));
        (cache, clock)
    }

    #[tokio::test]
    async fn test_second_call_within_ttl_is_served_from_cache() {
        let sdk = ScriptedSdk::new(vec![Ok(usdc("10"))]);
        let (cache, clock) = cache_with(sdk.clone());

        let first = cache.snapshot(false).await.unwrap();
        assert_eq!(first.freshness, Freshness::Fetched);
        assert_eq!(sdk.calls(), 1);

        clock.advance(Duration::from_secs(29));
        let second = cache.snapshot(false).await.unwrap();
        assert_eq!(second.freshness, Freshness::Cached);
        assert_eq!(second.balances, first.balances);
        assert_eq!(sdk.calls(), 1);
    }

    #[tokio::test]
    async fn test_keys_are_cached_separately() {
        let sdk = ScriptedSdk::new(vec![Ok(usdc("10")), Ok(usdc("25"))]);
        let (cache, _clock) = cache_with(sdk.clone());

        assert_eq!(cache.get_balances(false).await.unwrap(), usdc("10"));
        assert_eq!(cache.get_balances(true).await.unwrap(), usdc("25"));
        assert_eq!(cache.get_balances(false).await.unwrap(), usdc("10"));
        assert_eq!(sdk.calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let sdk = ScriptedSdk::new(vec![Ok(usdc("10")), Ok(usdc("12"))]);
        let (cache, clock) = cache_with(sdk.clone());

        cache.get_balances(false).await.unwrap();
        clock.advance(Duration::from_secs(30));

        assert_eq!(cache.get_balances(false).await.unwrap(), usdc("12"));
        assert_eq!(sdk.calls(), 2);
    }

    #[tokio::test]
    async fn test_network_failure_after_expiry_serves_stale() {
        let sdk = ScriptedSdk::new(vec![Ok(usdc("10")), Err(network_error())]);
        let (cache, clock) = cache_with(sdk.clone());

        cache.get_balances(false).await.unwrap();
        clock.advance(Duration::from_secs(31));

        let snapshot = cache.snapshot(false).await.unwrap();
        assert_eq!(snapshot.freshness, Freshness::Stale);
        assert_eq!(snapshot.balances, usdc("10"));
    }

    #[tokio::test]
    async fn test_network_failure_without_prior_entry_propagates() {
        let sdk = ScriptedSdk::new(vec![Err(network_error())]);
        let (cache, _clock) = cache_with(sdk);

        let err = cache.get_balances(false).await.unwrap_err();
        assert!(matches!(err, EngineError::Sdk(ref e) if e.code == SdkErrorCode::Network));
    }

    #[tokio::test]
    async fn test_non_transient_failure_is_not_masked() {
        let sdk = ScriptedSdk::new(vec![
            Ok(usdc("10")),
            Err(SdkError::from_message("invalid wallet session")),
        ]);
        let (cache, clock) = cache_with(sdk);

        cache.get_balances(false).await.unwrap();
        clock.advance(Duration::from_secs(31));

        let err = cache.get_balances(false).await.unwrap_err();
        assert!(matches!(err, EngineError::Sdk(ref e) if e.code == SdkErrorCode::Validation));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch_and_disables_stale() {
        let sdk = ScriptedSdk::new(vec![Ok(usdc("10")), Err(network_error())]);
        let (cache, _clock) = cache_with(sdk.clone());

        cache.get_balances(false).await.unwrap();
        cache.invalidate();

        // within TTL, but the entry is gone and so is the stale fallback
        assert!(cache.get_balances(false).await.is_err());
        assert_eq!(sdk.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_cold_calls_share_one_fetch() {
        let sdk = ScriptedSdk::slow(vec![Ok(usdc("10"))], Duration::from_millis(50));
        let (cache, _clock) = cache_with(sdk.clone());

        let (a, b) = tokio::join!(cache.get_balances(true), cache.get_balances(true));
        assert_eq!(a.unwrap(), usdc("10"));
        assert_eq!(b.unwrap(), usdc("10"));
        assert_eq!(sdk.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_cold_failure_shares_one_fetch() {
        let sdk = ScriptedSdk::slow(vec![Err(network_error())], Duration::from_millis(50));
        let (cache, _clock) = cache_with(sdk.clone());

        let (a, b) = tokio::join!(cache.get_balances(true), cache.get_balances(true));
        assert!(matches!(a, Err(EngineError::Sdk(ref e)) if e.code == SdkErrorCode::Network));
        assert!(matches!(b, Err(EngineError::Sdk(ref e)) if e.code == SdkErrorCode::Network));
        assert_eq!(sdk.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_stale_refresh_shares_one_fetch() {
        let sdk = ScriptedSdk::slow(
            vec![Ok(usdc("10")), Err(network_error())],
            Duration::from_millis(20),
        );
        let (cache, clock) = cache_with(sdk.clone());

        cache.get_balances(false).await.unwrap();
        clock.advance(Duration::from_secs(31));

        let (a, b) = tokio::join!(cache.snapshot(false), cache.snapshot(false));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.freshness, Freshness::Stale);
        assert_eq!(b.freshness, Freshness::Stale);
        assert_eq!(b.balances, usdc("10"));
        assert_eq!(sdk.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_reused_by_later_calls() {
        let sdk = ScriptedSdk::new(vec![Err(network_error()), Ok(usdc("7"))]);
        let (cache, _clock) = cache_with(sdk.clone());

        assert!(cache.get_balances(false).await.is_err());
        assert_eq!(cache.get_balances(false).await.unwrap(), usdc("7"));
        assert_eq!(sdk.calls(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_discards_result_for_later_callers() {
        let sdk = ScriptedSdk::slow(
            vec![Ok(usdc("10")), Ok(usdc("4"))],
            Duration::from_millis(50),
        );
        let (cache, _clock) = cache_with(sdk.clone());
        let cache = Arc::new(cache);

        let in_flight = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_balances(false).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate();

        assert_eq!(in_flight.await.unwrap().unwrap(), usdc("10"));
        assert_eq!(cache.get_balances(false).await.unwrap(), usdc("4"));
        assert_eq!(sdk.calls(), 2);
    }
}
