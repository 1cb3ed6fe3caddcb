//! Persistence boundary for subjects.
//!
//! The engine reads and writes only the fields it owns (peak score, review
//! timestamps, freshness marker); everything else about a tag or link
//! belongs to the wider application. Writes here are direct column writes
//! that must not trigger any side-effecting update hooks the domain store
//! may have.

use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::models::{LinkCard, LinkProvider, Recipient, SubjectId, Tag};

/// Review-state filters exposed to the admin listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewFilter {
    Reviewed,
    Unreviewed,
    PendingReview,
}

#[derive(Debug, Error)]
#[error("unknown filter: {0}")]
pub struct FilterError(pub String);

impl FromStr for ReviewFilter {
    type Err = FilterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "reviewed" => Ok(Self::Reviewed),
            "unreviewed" => Ok(Self::Unreviewed),
            "pending_review" => Ok(Self::PendingReview),
            other => Err(FilterError(other.to_string())),
        }
    }
}

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn get(&self, id: SubjectId) -> Result<Option<Tag>>;

    /// Bulk load; ids without a surviving tag are simply missing from the
    /// result.
    async fn load(&self, ids: &[SubjectId]) -> Result<Vec<Tag>>;

    /// Direct column write of the peak score fields. Never triggers update
    /// hooks.
    async fn store_peak(&self, id: SubjectId, score: f64, at: DateTime<Utc>) -> Result<()>;

    /// Set `review_requested_at` once. Returns `false` when it was already
    /// set, so callers can keep the notification one-shot under races.
    async fn touch_review_requested(&self, id: SubjectId, at: DateTime<Utc>) -> Result<bool>;

    async fn touch_last_used(&self, id: SubjectId, at: DateTime<Utc>) -> Result<()>;

    /// Review-state listing, ordered by the timestamp relevant to the
    /// filter (descending).
    async fn filter(&self, filter: ReviewFilter) -> Result<Vec<Tag>>;
}

#[async_trait]
pub trait LinkRepository: Send + Sync {
    async fn get(&self, id: SubjectId) -> Result<Option<LinkCard>>;

    async fn load(&self, ids: &[SubjectId]) -> Result<Vec<LinkCard>>;

    /// One-shot `review_requested_at` write on the link's provider.
    async fn touch_provider_review_requested(
        &self,
        provider_id: SubjectId,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn filter_providers(&self, filter: ReviewFilter) -> Result<Vec<LinkProvider>>;
}

/// Staff accounts opted into trend-review notifications.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn review_recipients(&self) -> Result<Vec<Recipient>>;
}

/// In-memory tag repository for tests and store-less deployments.
#[derive(Default)]
pub struct MemoryTagRepository {
    tags: Mutex<FxHashMap<SubjectId, Tag>>,
}

impl MemoryTagRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tag: Tag) {
        // A poisoned lock still holds a usable map.
        self.tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag.id, tag);
    }

    fn tags(&self) -> Result<MutexGuard<'_, FxHashMap<SubjectId, Tag>>> {
        self.tags
            .lock()
            .map_err(|_| anyhow!("tag repository mutex poisoned"))
    }
}

#[async_trait]
impl TagRepository for MemoryTagRepository {
    async fn get(&self, id: SubjectId) -> Result<Option<Tag>> {
        Ok(self.tags()?.get(&id).cloned())
    }

    async fn load(&self, ids: &[SubjectId]) -> Result<Vec<Tag>> {
        let tags = self.tags()?;
        Ok(ids.iter().filter_map(|id| tags.get(id).cloned()).collect())
    }

    async fn store_peak(&self, id: SubjectId, score: f64, at: DateTime<Utc>) -> Result<()> {
        if let Some(tag) = self.tags()?.get_mut(&id) {
            tag.max_score = score;
            tag.max_score_at = Some(at);
        }
        Ok(())
    }

    async fn touch_review_requested(&self, id: SubjectId, at: DateTime<Utc>) -> Result<bool> {
        let mut tags = self.tags()?;
        match tags.get_mut(&id) {
            Some(tag) if tag.review.review_requested_at.is_none() => {
                tag.review.review_requested_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_last_used(&self, id: SubjectId, at: DateTime<Utc>) -> Result<()> {
        if let Some(tag) = self.tags()?.get_mut(&id) {
            tag.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn filter(&self, filter: ReviewFilter) -> Result<Vec<Tag>> {
        let tags = self.tags()?;
        let mut result: Vec<Tag> = match filter {
            ReviewFilter::Reviewed => tags
                .values()
                .filter(|tag| !tag.review.requires_review())
                .cloned()
                .collect(),
            ReviewFilter::Unreviewed => tags
                .values()
                .filter(|tag| tag.review.requires_review())
                .cloned()
                .collect(),
            ReviewFilter::PendingReview => tags
                .values()
                .filter(|tag| tag.review.pending_review())
                .cloned()
                .collect(),
        };
        match filter {
            ReviewFilter::Reviewed => {
                result.sort_by_key(|tag| std::cmp::Reverse(tag.review.reviewed_at));
            }
            ReviewFilter::Unreviewed => result.sort_by_key(|tag| std::cmp::Reverse(tag.id)),
            ReviewFilter::PendingReview => {
                result.sort_by_key(|tag| std::cmp::Reverse(tag.review.review_requested_at));
            }
        }
        Ok(result)
    }
}

/// In-memory link repository for tests and store-less deployments.
#[derive(Default)]
pub struct MemoryLinkRepository {
    links: Mutex<FxHashMap<SubjectId, LinkCard>>,
}

impl MemoryLinkRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, link: LinkCard) {
        // A poisoned lock still holds a usable map.
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(link.id, link);
    }

    fn links(&self) -> Result<MutexGuard<'_, FxHashMap<SubjectId, LinkCard>>> {
        self.links
            .lock()
            .map_err(|_| anyhow!("link repository mutex poisoned"))
    }
}

#[async_trait]
impl LinkRepository for MemoryLinkRepository {
    async fn get(&self, id: SubjectId) -> Result<Option<LinkCard>> {
        Ok(self.links()?.get(&id).cloned())
    }

    async fn load(&self, ids: &[SubjectId]) -> Result<Vec<LinkCard>> {
        let links = self.links()?;
        Ok(ids.iter().filter_map(|id| links.get(id).cloned()).collect())
    }

    async fn touch_provider_review_requested(
        &self,
        provider_id: SubjectId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut links = self.links()?;
        let mut fired = false;
        for link in links.values_mut() {
            if let Some(provider) = link.provider.as_mut() {
                if provider.id == provider_id && provider.review.review_requested_at.is_none() {
                    provider.review.review_requested_at = Some(at);
                    fired = true;
                }
            }
        }
        Ok(fired)
    }

    async fn filter_providers(&self, filter: ReviewFilter) -> Result<Vec<LinkProvider>> {
        let links = self.links()?;
        let mut providers: FxHashMap<SubjectId, LinkProvider> = FxHashMap::default();
        for link in links.values() {
            if let Some(provider) = &link.provider {
                providers.insert(provider.id, provider.clone());
            }
        }
        let mut result: Vec<LinkProvider> = providers
            .into_values()
            .filter(|provider| match filter {
                ReviewFilter::Reviewed => !provider.review.requires_review(),
                ReviewFilter::Unreviewed => provider.review.requires_review(),
                ReviewFilter::PendingReview => provider.review.pending_review(),
            })
            .collect();
        match filter {
            ReviewFilter::Reviewed => {
                result.sort_by_key(|provider| std::cmp::Reverse(provider.review.reviewed_at));
            }
            ReviewFilter::Unreviewed => result.sort_by_key(|provider| std::cmp::Reverse(provider.id)),
            ReviewFilter::PendingReview => result
                .sort_by_key(|provider| std::cmp::Reverse(provider.review.review_requested_at)),
        }
        Ok(result)
    }
}

/// A fixed recipient list, for tests and single-tenant deployments where the
/// reviewer set is configured rather than queried.
pub struct StaticRecipients(pub Vec<Recipient>);

#[async_trait]
impl RecipientDirectory for StaticRecipients {
    async fn review_recipients(&self) -> Result<Vec<Recipient>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: SubjectId) -> Tag {
        Tag {
            id,
            name: format!("tag{id}"),
            usable: true,
            trendable: false,
            review: Default::default(),
            max_score: 0.0,
            max_score_at: None,
            last_used_at: None,
        }
    }

    #[test]
    fn unknown_filter_keys_are_rejected() {
        assert!("reviewed".parse::<ReviewFilter>().is_ok());
        assert!("pending_review".parse::<ReviewFilter>().is_ok());
        let error = "trending".parse::<ReviewFilter>().expect_err("unknown");
        assert_eq!(error.to_string(), "unknown filter: trending");
    }

    #[tokio::test]
    async fn touch_review_requested_is_one_shot() {
        let repo = MemoryTagRepository::new();
        repo.insert(tag(1));
        let at = Utc::now();

        assert!(repo.touch_review_requested(1, at).await.expect("touch"));
        assert!(!repo.touch_review_requested(1, at).await.expect("touch"));

        let stored = repo.get(1).await.expect("get").expect("tag exists");
        assert_eq!(stored.review.review_requested_at, Some(at));
    }

    #[tokio::test]
    async fn load_skips_missing_ids() {
        let repo = MemoryTagRepository::new();
        repo.insert(tag(1));
        repo.insert(tag(3));

        let loaded = repo.load(&[1, 2, 3]).await.expect("load");
        let mut ids: Vec<SubjectId> = loaded.iter().map(|tag| tag.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn pending_review_filter_orders_by_request_time() {
        let repo = MemoryTagRepository::new();
        let base = Utc::now();
        for id in 1..=3 {
            repo.insert(tag(id));
        }
        repo.touch_review_requested(1, base).await.expect("touch");
        repo.touch_review_requested(3, base + chrono::Duration::hours(1))
            .await
            .expect("touch");

        let pending = repo.filter(ReviewFilter::PendingReview).await.expect("filter");
        let ids: Vec<SubjectId> = pending.iter().map(|tag| tag.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }
}
