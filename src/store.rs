//! Shared engine store.
//!
//! All cross-invocation state of the trending engine (day counters,
//! distinct-actor sketches, used-today sets, ranked sets) lives behind the
//! [`Store`] trait, whose surface mirrors the key-value / approximate-set /
//! sorted-set / TTL primitives of a Redis-class store. [`memory::MemoryStore`]
//! is the in-process implementation used by the worker and its tests.

pub mod hll;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Store failures surfaced to callers.
///
/// `Unavailable` is transient and retryable at the caller's discretion;
/// `WrongType` means two code paths disagree about a key's shape and is fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("wrong value type at key {key}")]
    WrongType { key: String },
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Increment an integer counter, creating it at zero first.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Current counter value; absent or expired keys read as zero.
    async fn get_counter(&self, key: &str) -> Result<i64, StoreError>;

    /// Register a member in the approximate-cardinality sketch at `key`.
    async fn sketch_add(&self, key: &str, member: &[u8]) -> Result<(), StoreError>;

    /// Approximate number of distinct members added to the sketch at `key`.
    async fn sketch_count(&self, key: &str) -> Result<u64, StoreError>;

    /// Set or refresh a key's time-to-live. No-op for absent keys.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Add a member to an unordered set.
    async fn set_add(&self, key: &str, member: i64) -> Result<(), StoreError>;

    /// All members of an unordered set; empty for absent keys.
    async fn set_members(&self, key: &str) -> Result<Vec<i64>, StoreError>;

    /// Insert or update a sorted-set member with the given score.
    async fn zset_upsert(&self, key: &str, member: i64, score: f64) -> Result<(), StoreError>;

    /// Remove a sorted-set member if present.
    async fn zset_remove(&self, key: &str, member: i64) -> Result<(), StoreError>;

    /// Zero-based rank of a member ordered by descending score.
    async fn zset_rev_rank(&self, key: &str, member: i64) -> Result<Option<u64>, StoreError>;

    /// Score of a sorted-set member, if present.
    async fn zset_score(&self, key: &str, member: i64) -> Result<Option<f64>, StoreError>;

    /// Members ordered by descending score, from index `start` to `stop`
    /// inclusive; `stop = -1` means through the end.
    async fn zset_rev_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<i64>, StoreError>;

    /// Remove every member whose score is strictly below `watermark`.
    /// Returns the number of members removed.
    async fn zset_trim_below(&self, key: &str, watermark: f64) -> Result<u64, StoreError>;

    /// Number of members in a sorted set.
    async fn zset_len(&self, key: &str) -> Result<u64, StoreError>;
}
