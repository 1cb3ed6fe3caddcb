//! Rolling per-day usage statistics.
//!
//! Every (subject, calendar day) pair owns one day bucket in the shared
//! store: a raw use counter and a distinct-actor sketch, both refreshed to a
//! 7-day TTL on every use. [`UsageHistory`] is a derived 7-day view over the
//! buckets of one subject.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{Store, StoreError};
use crate::subject::models::{ActorId, SubjectId};
use crate::util::time::{beginning_of_day, day_key};

/// Buckets are dropped by the store this long after their last use.
pub const HISTORY_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Days covered by [`UsageHistory::last_7_days`].
const WINDOW_DAYS: i64 = 7;

/// Per-day usage counters for one subject kind.
#[derive(Clone)]
pub struct RollingDayCounter {
    store: Arc<dyn Store>,
    prefix: &'static str,
}

impl RollingDayCounter {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, prefix: &'static str) -> Self {
        Self { store, prefix }
    }

    fn key_for(&self, subject_id: SubjectId, at: DateTime<Utc>, suffix: &str) -> String {
        format!("activity:{}:{subject_id}:{}:{suffix}", self.prefix, day_key(at))
    }

    /// Record one use: bump the day's use counter, register the actor in the
    /// day's distinct-actor sketch, refresh both TTLs.
    ///
    /// # Errors
    /// Propagates store unavailability; nothing is retried here.
    pub async fn add(
        &self,
        subject_id: SubjectId,
        actor_id: ActorId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let uses_key = self.key_for(subject_id, at, "uses");
        let accounts_key = self.key_for(subject_id, at, "accounts");

        self.store.incr_by(&uses_key, 1).await?;
        self.store
            .sketch_add(&accounts_key, &actor_id.to_le_bytes())
            .await?;
        self.store.expire(&uses_key, HISTORY_RETENTION).await?;
        self.store.expire(&accounts_key, HISTORY_RETENTION).await?;

        Ok(())
    }

    /// Raw use count for the calendar day containing `at`; zero when the
    /// bucket is absent or expired.
    pub async fn uses(&self, subject_id: SubjectId, at: DateTime<Utc>) -> Result<i64, StoreError> {
        self.store
            .get_counter(&self.key_for(subject_id, at, "uses"))
            .await
    }

    /// Approximate distinct-actor count for the calendar day containing
    /// `at`; zero when the bucket is absent.
    pub async fn distinct_actors(
        &self,
        subject_id: SubjectId,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.store
            .sketch_count(&self.key_for(subject_id, at, "accounts"))
            .await
    }

    /// Derived 7-day view for one subject.
    #[must_use]
    pub fn for_subject(&self, subject_id: SubjectId) -> UsageHistory {
        UsageHistory {
            counter: self.clone(),
            subject_id,
        }
    }
}

/// One day of usage for one subject. Serialized with stringly-typed numbers
/// for parity with the upstream API shape.
#[derive(Debug, Clone, Serialize)]
pub struct DaySnapshot {
    day: String,
    accounts: String,
    uses: String,
}

impl DaySnapshot {
    #[must_use]
    pub fn day(&self) -> &str {
        &self.day
    }

    #[must_use]
    pub fn accounts(&self) -> u64 {
        self.accounts.parse().unwrap_or(0)
    }

    #[must_use]
    pub fn uses(&self) -> i64 {
        self.uses.parse().unwrap_or(0)
    }
}

/// Rolling 7-day time series over one subject's day buckets.
pub struct UsageHistory {
    counter: RollingDayCounter,
    subject_id: SubjectId,
}

impl UsageHistory {
    /// Snapshot of the calendar day containing `at`.
    pub async fn at(&self, at: DateTime<Utc>) -> Result<DaySnapshot, StoreError> {
        let uses = self.counter.uses(self.subject_id, at).await?;
        let accounts = self.counter.distinct_actors(self.subject_id, at).await?;
        Ok(DaySnapshot {
            day: beginning_of_day(at).timestamp().to_string(),
            accounts: accounts.to_string(),
            uses: uses.to_string(),
        })
    }

    /// Seven day snapshots, most recent first, starting with `now`'s day.
    pub async fn last_7_days(&self, now: DateTime<Utc>) -> Result<Vec<DaySnapshot>, StoreError> {
        let mut days = Vec::with_capacity(WINDOW_DAYS as usize);
        for offset in 0..WINDOW_DAYS {
            days.push(self.at(now - chrono::Duration::days(offset)).await?);
        }
        Ok(days)
    }
}
