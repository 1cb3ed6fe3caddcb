//! Capability adapters over the two subject kinds.
//!
//! The tracker is generic over [`TrendKind`]: everything tag- or
//! link-specific (eligibility, admission authority, review-state access,
//! peak bookkeeping, the decay asymmetry) lives behind this trait so the
//! engine itself exists once.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::subject::models::{LinkCard, ReviewState, SubjectId, Tag};
use crate::subject::repository::{LinkRepository, TagRepository};

use super::LAST_USED_THROTTLE_SECS;
use super::notifier::ReviewRequest;

/// Last recorded peak score and when it was set.
#[derive(Debug, Clone, Copy)]
pub struct Peak {
    pub score: f64,
    pub at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait TrendKind: Send + Sync + 'static {
    type Subject: Send + Sync;

    /// Key prefix for the ranked sets and the used-today set.
    fn prefix(&self) -> &'static str;

    /// Key prefix for the day buckets.
    fn history_prefix(&self) -> &'static str;

    /// Whether scores decay from a remembered peak (tags) or the raw
    /// anomaly score is written directly (links).
    fn decays(&self) -> bool;

    fn id_of(&self, subject: &Self::Subject) -> SubjectId;

    /// Whether events for this subject are recorded at all.
    fn is_eligible(&self, subject: &Self::Subject) -> bool;

    /// Whether the subject's admission authority allows public surfacing.
    fn is_admitted(&self, subject: &Self::Subject) -> bool;

    /// Review state of the admission authority; `None` when the subject has
    /// no authority to review (a link without a provider).
    fn review_state(&self, subject: &Self::Subject) -> Option<ReviewState>;

    fn peak(&self, subject: &Self::Subject) -> Peak;

    fn describe(&self, subject: &Self::Subject) -> ReviewRequest;

    async fn load(&self, ids: &[SubjectId]) -> Result<Vec<Self::Subject>>;

    /// Persist a new peak without firing update hooks.
    async fn store_peak(
        &self,
        subject: &Self::Subject,
        score: f64,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// One-shot `review_requested_at` write on the admission authority.
    /// Returns `false` when it was already set.
    async fn touch_review_requested(
        &self,
        subject: &Self::Subject,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Kind-specific bookkeeping on ingestion, after the history write.
    async fn record_use_metadata(
        &self,
        subject: &Self::Subject,
        at: DateTime<Utc>,
        original: bool,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct TagKind {
    repo: Arc<dyn TagRepository>,
}

impl TagKind {
    #[must_use]
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl TrendKind for TagKind {
    type Subject = Tag;

    fn prefix(&self) -> &'static str {
        "trending_tags"
    }

    fn history_prefix(&self) -> &'static str {
        "tags"
    }

    fn decays(&self) -> bool {
        true
    }

    fn id_of(&self, subject: &Tag) -> SubjectId {
        subject.id
    }

    fn is_eligible(&self, subject: &Tag) -> bool {
        subject.usable
    }

    fn is_admitted(&self, subject: &Tag) -> bool {
        subject.trendable
    }

    fn review_state(&self, subject: &Tag) -> Option<ReviewState> {
        Some(subject.review)
    }

    fn peak(&self, subject: &Tag) -> Peak {
        Peak {
            score: subject.max_score,
            at: subject.max_score_at,
        }
    }

    fn describe(&self, subject: &Tag) -> ReviewRequest {
        ReviewRequest {
            kind: "tag",
            subject_id: subject.id,
            name: subject.name.clone(),
        }
    }

    async fn load(&self, ids: &[SubjectId]) -> Result<Vec<Tag>> {
        self.repo.load(ids).await
    }

    async fn store_peak(&self, subject: &Tag, score: f64, at: DateTime<Utc>) -> Result<()> {
        self.repo.store_peak(subject.id, score, at).await
    }

    async fn touch_review_requested(&self, subject: &Tag, at: DateTime<Utc>) -> Result<bool> {
        self.repo.touch_review_requested(subject.id, at).await
    }

    async fn record_use_metadata(&self, subject: &Tag, at: DateTime<Utc>, original: bool) -> Result<()> {
        if !original {
            return Ok(());
        }
        // At most one freshness write per 12 hours, and never backwards.
        let due = match subject.last_used_at {
            None => true,
            Some(last) => last < at && last < at - Duration::seconds(LAST_USED_THROTTLE_SECS),
        };
        if due {
            self.repo.touch_last_used(subject.id, at).await?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct LinkKind {
    repo: Arc<dyn LinkRepository>,
}

impl LinkKind {
    #[must_use]
    pub fn new(repo: Arc<dyn LinkRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl TrendKind for LinkKind {
    type Subject = LinkCard;

    fn prefix(&self) -> &'static str {
        "trending_links"
    }

    fn history_prefix(&self) -> &'static str {
        "links"
    }

    fn decays(&self) -> bool {
        false
    }

    fn id_of(&self, subject: &LinkCard) -> SubjectId {
        subject.id
    }

    fn is_eligible(&self, subject: &LinkCard) -> bool {
        subject.appropriate_for_trends
    }

    fn is_admitted(&self, subject: &LinkCard) -> bool {
        subject
            .provider
            .as_ref()
            .is_some_and(|provider| provider.trendable)
    }

    fn review_state(&self, subject: &LinkCard) -> Option<ReviewState> {
        subject.provider.as_ref().map(|provider| provider.review)
    }

    fn peak(&self, _subject: &LinkCard) -> Peak {
        Peak {
            score: 0.0,
            at: None,
        }
    }

    fn describe(&self, subject: &LinkCard) -> ReviewRequest {
        ReviewRequest {
            kind: "link",
            subject_id: subject.id,
            name: subject.url.clone(),
        }
    }

    async fn load(&self, ids: &[SubjectId]) -> Result<Vec<LinkCard>> {
        self.repo.load(ids).await
    }

    async fn store_peak(&self, _subject: &LinkCard, _score: f64, _at: DateTime<Utc>) -> Result<()> {
        // Links carry no peak bookkeeping; their raw score is written as-is.
        Ok(())
    }

    async fn touch_review_requested(&self, subject: &LinkCard, at: DateTime<Utc>) -> Result<bool> {
        match &subject.provider {
            Some(provider) => {
                self.repo
                    .touch_provider_review_requested(provider.id, at)
                    .await
            }
            None => Ok(false),
        }
    }

    async fn record_use_metadata(
        &self,
        _subject: &LinkCard,
        _at: DateTime<Utc>,
        _original: bool,
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::repository::MemoryTagRepository;

    fn parse_utc(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn tag(last_used_at: Option<DateTime<Utc>>) -> Tag {
        Tag {
            id: 1,
            name: "rustlang".to_string(),
            usable: true,
            trendable: false,
            review: Default::default(),
            max_score: 0.0,
            max_score_at: None,
            last_used_at,
        }
    }

    async fn last_used_after(
        existing: Option<DateTime<Utc>>,
        original: bool,
        at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let repo = Arc::new(MemoryTagRepository::new());
        let subject = tag(existing);
        repo.insert(subject.clone());
        let kind = TagKind::new(repo.clone());
        kind.record_use_metadata(&subject, at, original)
            .await
            .expect("record");
        repo.get(1).await.expect("get").expect("tag").last_used_at
    }

    #[tokio::test]
    async fn first_original_use_sets_last_used() {
        let at = parse_utc("2025-11-08T10:00:00Z");
        assert_eq!(last_used_after(None, true, at).await, Some(at));
    }

    #[tokio::test]
    async fn reshares_never_touch_last_used() {
        let at = parse_utc("2025-11-08T10:00:00Z");
        assert_eq!(last_used_after(None, false, at).await, None);
    }

    #[tokio::test]
    async fn last_used_is_throttled_to_12_hours() {
        let at = parse_utc("2025-11-08T10:00:00Z");
        let recent = parse_utc("2025-11-08T04:00:00Z");
        let stale = parse_utc("2025-11-07T08:00:00Z");

        assert_eq!(last_used_after(Some(recent), true, at).await, Some(recent));
        assert_eq!(last_used_after(Some(stale), true, at).await, Some(at));
    }

    #[tokio::test]
    async fn last_used_never_moves_backwards() {
        let at = parse_utc("2025-11-08T10:00:00Z");
        let future = parse_utc("2025-11-09T10:00:00Z");
        assert_eq!(last_used_after(Some(future), true, at).await, Some(future));
    }
}
