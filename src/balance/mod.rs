//! Balance caching
//!
//! Handles:
//! - TTL-bounded caching of unified balances
//! - Stale serving when the upstream fetch fails transiently
//! - Single-flight fetches per cache key
//! - Explicit invalidation after state-changing operations

mod cache;
mod clock;

pub use cache::{BalanceCache, BalanceSnapshot, Freshness};
pub use clock::{Clock, SystemClock};

#[cfg(test)]
pub(crate) use clock::ManualClock;
