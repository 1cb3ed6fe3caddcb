//! Ranked trending sets.
//!
//! Two sorted sets per subject kind, keyed by subject id with the score as
//! the ranking key: `all` holds every scored subject, `allowed` the subset
//! admitted to public surfacing. A same-day membership set records which
//! subjects saw at least one event today; it seeds the next recomputation's
//! candidate pool.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::store::{Store, StoreError};
use crate::subject::models::SubjectId;
use crate::util::time::day_key;

use super::USED_TODAY_TTL;

#[derive(Clone)]
pub struct TrendingSet {
    store: Arc<dyn Store>,
    prefix: &'static str,
}

impl TrendingSet {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, prefix: &'static str) -> Self {
        Self { store, prefix }
    }

    fn all_key(&self) -> String {
        format!("{}:all", self.prefix)
    }

    fn allowed_key(&self) -> String {
        format!("{}:allowed", self.prefix)
    }

    fn used_key(&self, at: DateTime<Utc>) -> String {
        format!("{}:used:{}", self.prefix, day_key(at))
    }

    /// Mark a subject as used on `at`'s calendar day.
    pub async fn record_used_today(
        &self,
        subject_id: SubjectId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = self.used_key(at);
        self.store.set_add(&key, subject_id).await?;
        self.store.expire(&key, USED_TODAY_TTL).await
    }

    /// Subjects that saw at least one event on `at`'s calendar day.
    pub async fn used_today(&self, at: DateTime<Utc>) -> Result<Vec<SubjectId>, StoreError> {
        self.store.set_members(&self.used_key(at)).await
    }

    /// Write one subject's score. A zero score removes it from both sets; a
    /// non-admitted subject is kept out of `allowed` even if it was there
    /// from before its admission flag was cleared.
    pub async fn upsert_score(
        &self,
        subject_id: SubjectId,
        score: f64,
        admitted: bool,
    ) -> Result<(), StoreError> {
        if score == 0.0 {
            self.store.zset_remove(&self.all_key(), subject_id).await?;
            self.store
                .zset_remove(&self.allowed_key(), subject_id)
                .await?;
            return Ok(());
        }

        self.store
            .zset_upsert(&self.all_key(), subject_id, score)
            .await?;
        if admitted {
            self.store
                .zset_upsert(&self.allowed_key(), subject_id, score)
                .await?;
        } else {
            self.store
                .zset_remove(&self.allowed_key(), subject_id)
                .await?;
        }
        Ok(())
    }

    /// Up to `limit` subject ids by descending score; `limit = -1` means all.
    pub async fn top_n(&self, limit: i64, filtered: bool) -> Result<Vec<SubjectId>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let key = if filtered {
            self.allowed_key()
        } else {
            self.all_key()
        };
        let stop = if limit < 0 { -1 } else { limit - 1 };
        self.store.zset_rev_range(&key, 0, stop).await
    }

    /// Zero-based descending rank in `all`.
    pub async fn rank_of(&self, subject_id: SubjectId) -> Result<Option<u64>, StoreError> {
        self.store.zset_rev_rank(&self.all_key(), subject_id).await
    }

    /// Current score in `all`, if ranked.
    pub async fn score_of(&self, subject_id: SubjectId) -> Result<Option<f64>, StoreError> {
        self.store.zset_score(&self.all_key(), subject_id).await
    }

    /// Drop every entry scoring strictly below `watermark` from both sets.
    pub async fn trim(&self, watermark: f64) -> Result<u64, StoreError> {
        let from_all = self.store.zset_trim_below(&self.all_key(), watermark).await?;
        let from_allowed = self
            .store
            .zset_trim_below(&self.allowed_key(), watermark)
            .await?;
        Ok(from_all + from_allowed)
    }

    /// Current size of `all` or `allowed`, for gauges.
    pub async fn len(&self, filtered: bool) -> Result<u64, StoreError> {
        let key = if filtered {
            self.allowed_key()
        } else {
            self.all_key()
        };
        self.store.zset_len(&key).await
    }
}
