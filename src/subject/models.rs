use chrono::{DateTime, Utc};
use serde::Serialize;

pub type SubjectId = i64;
pub type ActorId = i64;

/// Review bookkeeping shared by tags and link providers.
///
/// Both timestamps are written at most once and never cleared: `reviewed_at`
/// when a moderator decides, `review_requested_at` when the engine fires its
/// one-time review notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewState {
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_requested_at: Option<DateTime<Utc>>,
}

impl ReviewState {
    /// A subject needs review until a moderator has looked at it.
    #[must_use]
    pub fn requires_review(&self) -> bool {
        self.reviewed_at.is_none()
    }

    #[must_use]
    pub fn requested_review(&self) -> bool {
        self.review_requested_at.is_some()
    }

    /// Unreviewed and already queued for a reviewer.
    #[must_use]
    pub fn pending_review(&self) -> bool {
        self.requires_review() && self.requested_review()
    }
}

/// A hashtag. The tag is its own admission authority: `trendable` is set by
/// moderation directly on the tag.
#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: SubjectId,
    pub name: String,
    /// Not blocked or suppressed; ineligible tags record no statistics.
    pub usable: bool,
    /// Allowed to surface in the public trends listing.
    pub trendable: bool,
    #[serde(flatten)]
    pub review: ReviewState,
    /// Peak anomaly score, reset after the cooldown window.
    pub max_score: f64,
    pub max_score_at: Option<DateTime<Utc>>,
    /// Throttled freshness marker, updated at most once per 12 hours and
    /// only from original statuses.
    pub last_used_at: Option<DateTime<Utc>>,
}

/// The domain provider controlling whether links from it may trend.
#[derive(Debug, Clone, Serialize)]
pub struct LinkProvider {
    pub id: SubjectId,
    pub domain: String,
    pub trendable: bool,
    #[serde(flatten)]
    pub review: ReviewState,
}

/// A shared link (preview card). Eligibility is decided upstream when the
/// card is fetched; the engine only consumes the flag.
#[derive(Debug, Clone, Serialize)]
pub struct LinkCard {
    pub id: SubjectId,
    pub url: String,
    pub title: String,
    pub appropriate_for_trends: bool,
    pub provider: Option<LinkProvider>,
}

/// A staff account opted into trend-review notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub account_id: i64,
    pub handle: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_state_transitions() {
        let fresh = ReviewState::default();
        assert!(fresh.requires_review());
        assert!(!fresh.requested_review());
        assert!(!fresh.pending_review());

        let requested = ReviewState {
            reviewed_at: None,
            review_requested_at: Some(Utc::now()),
        };
        assert!(requested.pending_review());

        let reviewed = ReviewState {
            reviewed_at: Some(Utc::now()),
            review_requested_at: Some(Utc::now()),
        };
        assert!(!reviewed.requires_review());
        assert!(!reviewed.pending_review());
    }
}
