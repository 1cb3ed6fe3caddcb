//! The per-kind trending tracker.
//!
//! Ingestion records a use into the day buckets and the used-today set.
//! `calculate` is the recurring two-pass recomputation: pass one scores every
//! candidate and rewrites the ranked sets, pass two reads the resulting
//! ranks and fires one-time review notifications, then both sets are
//! trimmed. The two passes must not interleave because pass two depends on
//! the ranks pass one wrote; the scheduler guarantees single-flight across
//! cycles.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use crate::history::{RollingDayCounter, UsageHistory};
use crate::store::Store;
use crate::subject::models::{ActorId, SubjectId};
use crate::subject::repository::RecipientDirectory;
use crate::util::time::previous_day;

use super::kind::TrendKind;
use super::notifier::ReviewNotifier;
use super::set::TrendingSet;
use super::{
    MAX_SCORE_COOLDOWN_SECS, MAX_SCORE_HALFLIFE_SECS, REVIEW_THRESHOLD, SCORE_LOW_WATERMARK,
    THRESHOLD,
};

/// Chi-square-like novelty statistic: rewards large unexpected jumps in
/// distinct-actor usage relative to yesterday's baseline, suppresses noise
/// below a minimum absolute-activity floor, and treats a missing baseline as
/// a weak one rather than infinite surprise.
#[must_use]
pub fn raw_anomaly_score(observed: f64, expected: f64) -> f64 {
    let expected = if expected == 0.0 { 1.0 } else { expected };
    if expected > observed || observed < THRESHOLD {
        0.0
    } else {
        (observed - expected).powi(2) / expected
    }
}

/// What one recomputation cycle did, for logs and metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleSummary {
    pub candidates: usize,
    pub scored: usize,
    pub notified: usize,
    pub notification_failures: usize,
    pub trimmed: u64,
}

pub struct Tracker<K: TrendKind> {
    kind: K,
    history: RollingDayCounter,
    set: TrendingSet,
    recipients: Arc<dyn RecipientDirectory>,
    notifier: Arc<dyn ReviewNotifier>,
}

impl<K: TrendKind> Tracker<K> {
    pub fn new(
        kind: K,
        store: Arc<dyn Store>,
        recipients: Arc<dyn RecipientDirectory>,
        notifier: Arc<dyn ReviewNotifier>,
    ) -> Self {
        let history = RollingDayCounter::new(Arc::clone(&store), kind.history_prefix());
        let set = TrendingSet::new(store, kind.prefix());
        Self {
            kind,
            history,
            set,
            recipients,
            notifier,
        }
    }

    /// Record one usage event. Cheap: two counter writes and a set write,
    /// no scoring. Ineligible subjects are dropped before any write.
    ///
    /// # Errors
    /// Store unavailability propagates to the caller, whose own policy
    /// decides whether to retry the event.
    pub async fn record_use(
        &self,
        subject: &K::Subject,
        actor_id: ActorId,
        original: bool,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if !self.kind.is_eligible(subject) {
            return Ok(());
        }

        let subject_id = self.kind.id_of(subject);
        // Stats are recorded even for subjects not allowed to trend; they
        // are shown in other places.
        self.history
            .add(subject_id, actor_id, at)
            .await
            .context("failed to record usage history")?;
        self.set
            .record_used_today(subject_id, at)
            .await
            .context("failed to record used-today membership")?;
        self.kind.record_use_metadata(subject, at, original).await
    }

    /// Run one recomputation cycle at `at`.
    ///
    /// # Errors
    /// Aborts cleanly on store failure; scores already written this cycle
    /// stand, and the next cycle recomputes everything from scratch.
    pub async fn calculate(&self, at: DateTime<Utc>) -> Result<CycleSummary> {
        let candidate_ids = self.candidate_ids(at).await?;
        let subjects = self
            .kind
            .load(&candidate_ids)
            .await
            .context("failed to load candidate subjects")?;

        let mut summary = CycleSummary {
            candidates: subjects.len(),
            ..CycleSummary::default()
        };

        // First pass: compute scores and rewrite the ranked sets.
        for subject in &subjects {
            self.score_subject(subject, at).await?;
            summary.scored += 1;
        }

        // Second pass: review notifications, against the just-written ranks.
        let recipients = self
            .recipients
            .review_recipients()
            .await
            .context("failed to load review recipients")?;

        for subject in &subjects {
            let (notified, failures) = self.maybe_request_review(subject, &recipients, at).await?;
            summary.notified += notified;
            summary.notification_failures += failures;
        }

        summary.trimmed = self
            .set
            .trim(SCORE_LOW_WATERMARK)
            .await
            .context("failed to trim ranked sets")?;

        info!(
            kind = self.kind.prefix(),
            candidates = summary.candidates,
            notified = summary.notified,
            trimmed = summary.trimmed,
            "trend recomputation cycle finished"
        );

        Ok(summary)
    }

    /// Union of subjects used today and subjects currently ranked, in that
    /// order, deduplicated. Newly active subjects are always considered;
    /// ranked subjects keep being re-evaluated until they decay out.
    async fn candidate_ids(&self, at: DateTime<Utc>) -> Result<Vec<SubjectId>> {
        let mut ids = self
            .set
            .used_today(at)
            .await
            .context("failed to read used-today set")?;
        ids.extend(
            self.set
                .top_n(-1, false)
                .await
                .context("failed to read ranked set")?,
        );

        let mut seen = FxHashSet::default();
        ids.retain(|id| seen.insert(*id));
        Ok(ids)
    }

    async fn score_subject(&self, subject: &K::Subject, at: DateTime<Utc>) -> Result<()> {
        let subject_id = self.kind.id_of(subject);

        let observed = self
            .history
            .distinct_actors(subject_id, at)
            .await
            .context("failed to read observed actor count")? as f64;
        let expected = self
            .history
            .distinct_actors(subject_id, previous_day(at))
            .await
            .context("failed to read baseline actor count")? as f64;

        let raw = raw_anomaly_score(observed, expected);

        let score = if self.kind.decays() {
            self.decayed_score(subject, raw, at).await?
        } else {
            raw
        };

        debug!(
            kind = self.kind.prefix(),
            subject_id, observed, expected, raw, score, "scored candidate"
        );

        self.set
            .upsert_score(subject_id, score, self.kind.is_admitted(subject))
            .await
            .context("failed to write score")?;
        Ok(())
    }

    /// Exponential half-life decay from the last peak. The remembered peak
    /// is forgotten once it is older than the cooldown window, so a subject
    /// cannot coast on an ancient burst.
    async fn decayed_score(&self, subject: &K::Subject, raw: f64, at: DateTime<Utc>) -> Result<f64> {
        let peak = self.kind.peak(subject);
        let cooled_off = peak
            .at
            .is_none_or(|peak_at| peak_at < at - Duration::seconds(MAX_SCORE_COOLDOWN_SECS));

        let (mut max_score, mut max_score_at) = if cooled_off {
            (0.0, peak.at)
        } else {
            (peak.score, peak.at)
        };

        if raw > max_score {
            max_score = raw;
            max_score_at = Some(at);
            self.kind
                .store_peak(subject, raw, at)
                .await
                .context("failed to persist peak score")?;
        }

        let anchor = max_score_at.unwrap_or(at);
        let elapsed = (at - anchor).num_seconds() as f64;
        Ok(max_score * 0.5f64.powf(elapsed / MAX_SCORE_HALFLIFE_SECS as f64))
    }

    /// Fire the one-time review request when an unreviewed, non-admitted
    /// candidate ranks at or above the review threshold. Returns how many
    /// notifications were dispatched and how many dispatches failed.
    async fn maybe_request_review(
        &self,
        subject: &K::Subject,
        recipients: &[crate::subject::models::Recipient],
        at: DateTime<Utc>,
    ) -> Result<(usize, usize)> {
        if self.kind.is_admitted(subject) {
            return Ok((0, 0));
        }

        let Some(review) = self.kind.review_state(subject) else {
            return Ok((0, 0));
        };
        if !review.requires_review() || review.requested_review() {
            return Ok((0, 0));
        }

        let subject_id = self.kind.id_of(subject);
        let rank = self
            .set
            .rank_of(subject_id)
            .await
            .context("failed to read rank")?;
        if !rank.is_some_and(|rank| rank <= REVIEW_THRESHOLD) {
            return Ok((0, 0));
        }

        // The one-shot write is the structural idempotency guard; a raced
        // cycle loses here and fires nothing.
        if !self
            .kind
            .touch_review_requested(subject, at)
            .await
            .context("failed to touch review_requested_at")?
        {
            return Ok((0, 0));
        }

        let request = self.kind.describe(subject);
        info!(
            kind = request.kind,
            subject_id = request.subject_id,
            subject = %request.name,
            rank = rank.unwrap_or(0),
            recipients = recipients.len(),
            "requesting trend review"
        );

        let mut notified = 0;
        let mut failures = 0;
        for recipient in recipients {
            match self.notifier.notify(recipient, &request).await {
                Ok(()) => notified += 1,
                Err(error) => {
                    // Best effort per recipient; one failure never blocks
                    // the rest of the fan-out.
                    warn!(
                        recipient = %recipient.handle,
                        subject_id = request.subject_id,
                        error = %error,
                        "review notification dispatch failed"
                    );
                    failures += 1;
                }
            }
        }

        Ok((notified, failures))
    }

    /// Top subjects by descending score, materialized from the repository.
    /// Ids whose subject no longer exists are skipped silently.
    ///
    /// # Errors
    /// Propagates store and repository failures.
    pub async fn top(&self, limit: i64, filtered: bool) -> Result<Vec<K::Subject>> {
        let ids = self
            .set
            .top_n(limit, filtered)
            .await
            .context("failed to read ranked ids")?;
        let loaded = self.kind.load(&ids).await.context("failed to load subjects")?;

        // Restore ranking order; `load` has no order contract.
        let mut by_id: rustc_hash::FxHashMap<SubjectId, K::Subject> = loaded
            .into_iter()
            .map(|subject| (self.kind.id_of(&subject), subject))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// 7-day usage view for one subject.
    #[must_use]
    pub fn usage_history(&self, subject_id: SubjectId) -> UsageHistory {
        self.history.for_subject(subject_id)
    }

    /// Ranked-set sizes for gauges: (all, allowed).
    pub async fn set_sizes(&self) -> Result<(u64, u64)> {
        let all = self.set.len(false).await?;
        let allowed = self.set.len(true).await?;
        Ok((all, allowed))
    }
}
