//! End-to-end recomputation cycles over the in-memory store.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use trends_worker::store::Store;
use trends_worker::store::memory::MemoryStore;
use trends_worker::subject::models::{
    LinkCard, LinkProvider, Recipient, ReviewState, SubjectId, Tag,
};
use trends_worker::subject::repository::{
    MemoryLinkRepository, MemoryTagRepository, StaticRecipients, TagRepository,
};
use trends_worker::trending::kind::{LinkKind, TagKind};
use trends_worker::trending::notifier::{ReviewNotifier, ReviewRequest};
use trends_worker::trending::set::TrendingSet;
use trends_worker::trending::tracker::Tracker;

fn parse_utc(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .expect("valid datetime")
        .with_timezone(&Utc)
}

fn tag(id: SubjectId, trendable: bool) -> Tag {
    Tag {
        id,
        name: format!("tag{id}"),
        usable: true,
        trendable,
        review: ReviewState::default(),
        max_score: 0.0,
        max_score_at: None,
        last_used_at: None,
    }
}

fn link(id: SubjectId, appropriate: bool, provider_trendable: bool) -> LinkCard {
    LinkCard {
        id,
        url: format!("https://example.com/{id}"),
        title: format!("article {id}"),
        appropriate_for_trends: appropriate,
        provider: Some(LinkProvider {
            id: 1000 + id,
            domain: "example.com".to_string(),
            trendable: provider_trendable,
            review: ReviewState::default(),
        }),
    }
}

/// Collects dispatched notifications; optionally fails for chosen handles.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, SubjectId)>>,
    failing_handles: Vec<String>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(String, SubjectId)> {
        self.sent.lock().expect("notifier lock").clone()
    }
}

#[async_trait]
impl ReviewNotifier for RecordingNotifier {
    async fn notify(&self, recipient: &Recipient, request: &ReviewRequest) -> Result<()> {
        if self.failing_handles.contains(&recipient.handle) {
            anyhow::bail!("delivery refused for {}", recipient.handle);
        }
        self.sent
            .lock()
            .expect("notifier lock")
            .push((recipient.handle.clone(), request.subject_id));
        Ok(())
    }
}

struct TagHarness {
    store: Arc<dyn Store>,
    repo: Arc<MemoryTagRepository>,
    notifier: Arc<RecordingNotifier>,
    tracker: Tracker<TagKind>,
}

fn tag_harness(recipients: Vec<Recipient>, notifier: RecordingNotifier) -> TagHarness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let repo = Arc::new(MemoryTagRepository::new());
    let notifier = Arc::new(notifier);
    let tracker = Tracker::new(
        TagKind::new(repo.clone()),
        Arc::clone(&store),
        Arc::new(StaticRecipients(recipients)),
        notifier.clone(),
    );
    TagHarness {
        store,
        repo,
        notifier,
        tracker,
    }
}

fn staff(handle: &str) -> Recipient {
    Recipient {
        account_id: handle.len() as i64,
        handle: handle.to_string(),
    }
}

fn tag_set(store: &Arc<dyn Store>) -> TrendingSet {
    TrendingSet::new(Arc::clone(store), "trending_tags")
}

#[tokio::test]
async fn burst_tag_ranks_first_and_fires_review_exactly_once() {
    let harness = tag_harness(
        vec![staff("mod-a"), staff("mod-b")],
        RecordingNotifier::default(),
    );
    let at = parse_utc("2025-11-08T12:00:00Z");

    let subject = tag(1, false);
    harness.repo.insert(subject.clone());
    for actor in 0..6 {
        harness
            .tracker
            .record_use(&subject, actor, true, at)
            .await
            .expect("record");
    }

    let summary = harness.tracker.calculate(at).await.expect("calculate");
    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.notified, 2);

    // observed=6, expected=0 -> 1.0, raw = (6-1)^2/1 = 25, fresh peak.
    let set = tag_set(&harness.store);
    assert_eq!(set.rank_of(1).await.expect("rank"), Some(0));
    let score = set.score_of(1).await.expect("score").expect("ranked");
    assert!((score - 25.0).abs() < 1e-9);

    // Not admitted, so never surfaced in the allowed listing.
    assert!(
        harness
            .tracker
            .top(10, true)
            .await
            .expect("allowed listing")
            .is_empty()
    );
    let all = harness.tracker.top(10, false).await.expect("all listing");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, 1);

    let mut handles: Vec<String> = harness
        .notifier
        .sent()
        .into_iter()
        .map(|(handle, _)| handle)
        .collect();
    handles.sort();
    assert_eq!(handles, vec!["mod-a".to_string(), "mod-b".to_string()]);

    // Unchanged inputs: the one-shot timestamp keeps it silent.
    let again = harness
        .tracker
        .calculate(at + Duration::minutes(5))
        .await
        .expect("second cycle");
    assert_eq!(again.notified, 0);
    assert_eq!(harness.notifier.sent().len(), 2);

    let stored = harness
        .repo
        .get(1)
        .await
        .expect("get")
        .expect("tag exists");
    assert!(stored.review.pending_review());
}

#[tokio::test]
async fn below_activity_floor_never_scores() {
    let harness = tag_harness(vec![staff("mod-a")], RecordingNotifier::default());
    let at = parse_utc("2025-11-08T12:00:00Z");

    let subject = tag(1, false);
    harness.repo.insert(subject.clone());
    for actor in 0..4 {
        harness
            .tracker
            .record_use(&subject, actor, true, at)
            .await
            .expect("record");
    }

    harness.tracker.calculate(at).await.expect("calculate");

    let set = tag_set(&harness.store);
    assert_eq!(set.rank_of(1).await.expect("rank"), None);
    assert!(harness.notifier.sent().is_empty());
}

#[tokio::test]
async fn tag_scores_decay_with_a_two_hour_half_life() {
    let harness = tag_harness(vec![], RecordingNotifier::default());
    let burst_at = parse_utc("2025-11-08T12:00:00Z");

    let subject = tag(1, true);
    harness.repo.insert(subject.clone());
    for actor in 0..6 {
        harness
            .tracker
            .record_use(&subject, actor, true, burst_at)
            .await
            .expect("record");
    }
    harness.tracker.calculate(burst_at).await.expect("first cycle");

    // Two hours later, same day: observed unchanged, no new peak, so the
    // stored peak of 25 has halved once.
    harness
        .tracker
        .calculate(burst_at + Duration::hours(2))
        .await
        .expect("second cycle");

    let set = tag_set(&harness.store);
    let score = set.score_of(1).await.expect("score").expect("ranked");
    assert!((score - 12.5).abs() < 1e-6, "decayed score was {score}");

    // Admitted tags surface in the allowed set at the decayed score.
    let allowed = harness.tracker.top(10, true).await.expect("allowed");
    assert_eq!(allowed.len(), 1);
}

#[tokio::test]
async fn peaks_older_than_the_cooldown_are_forgotten() {
    let harness = tag_harness(vec![], RecordingNotifier::default());
    let at = parse_utc("2025-11-08T12:00:00Z");

    // A tag still ranked from an old burst, with no activity today. Its
    // remembered peak is past the two-day cooldown, so nothing is left to
    // decay from and the entry drops out entirely.
    let mut subject = tag(1, true);
    subject.max_score = 25.0;
    subject.max_score_at = Some(at - Duration::days(3));
    harness.repo.insert(subject.clone());

    let set = tag_set(&harness.store);
    set.upsert_score(1, 0.4, true).await.expect("seed rank");

    harness.tracker.calculate(at).await.expect("calculate");

    assert_eq!(set.rank_of(1).await.expect("rank"), None);
    assert!(harness.tracker.top(-1, false).await.expect("all").is_empty());

    // No fresh peak was written; the stale one just stopped counting.
    let stored = harness.repo.get(1).await.expect("get").expect("tag exists");
    assert_eq!(stored.max_score_at, Some(at - Duration::days(3)));
}

#[tokio::test]
async fn a_smaller_fresh_burst_replaces_a_cooled_off_peak() {
    let harness = tag_harness(vec![], RecordingNotifier::default());
    let at = parse_utc("2025-11-08T12:00:00Z");

    let mut subject = tag(1, true);
    subject.max_score = 100.0;
    subject.max_score_at = Some(at - Duration::days(3));
    harness.repo.insert(subject.clone());

    // Six actors today: raw score 25, well under the old peak of 100. The
    // cooled-off peak must not win the comparison.
    for actor in 0..6 {
        harness
            .tracker
            .record_use(&subject, actor, true, at)
            .await
            .expect("record");
    }

    harness.tracker.calculate(at).await.expect("calculate");

    let set = tag_set(&harness.store);
    let score = set.score_of(1).await.expect("score").expect("ranked");
    assert!((score - 25.0).abs() < 1e-9, "score was {score}");

    let stored = harness.repo.get(1).await.expect("get").expect("tag exists");
    assert!((stored.max_score - 25.0).abs() < 1e-9);
    assert_eq!(stored.max_score_at, Some(at));
}

#[tokio::test]
async fn decayed_entries_below_the_watermark_are_trimmed() {
    let harness = tag_harness(vec![], RecordingNotifier::default());
    let burst_at = parse_utc("2025-11-08T00:30:00Z");

    let subject = tag(1, true);
    harness.repo.insert(subject.clone());
    for actor in 0..6 {
        harness
            .tracker
            .record_use(&subject, actor, true, burst_at)
            .await
            .expect("record");
    }
    harness.tracker.calculate(burst_at).await.expect("first cycle");

    // 25 * 0.5^(14h / 2h) is well under the 0.3 watermark.
    harness
        .tracker
        .calculate(burst_at + Duration::hours(14))
        .await
        .expect("later cycle");

    let set = tag_set(&harness.store);
    assert_eq!(set.rank_of(1).await.expect("rank"), None);
    assert!(harness.tracker.top(-1, false).await.expect("all").is_empty());
}

#[tokio::test]
async fn link_scores_are_raw_and_vanish_without_a_fresh_anomaly() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let repo = Arc::new(MemoryLinkRepository::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let tracker = Tracker::new(
        LinkKind::new(repo.clone()),
        Arc::clone(&store),
        Arc::new(StaticRecipients(vec![])),
        notifier,
    );

    let day_one = parse_utc("2025-11-08T12:00:00Z");
    let subject = link(1, true, true);
    repo.insert(subject.clone());
    for actor in 0..6 {
        tracker
            .record_use(&subject, actor, true, day_one)
            .await
            .expect("record");
    }

    tracker.calculate(day_one).await.expect("day one cycle");
    let set = TrendingSet::new(Arc::clone(&store), "trending_links");
    let score = set.score_of(1).await.expect("score").expect("ranked");
    assert!((score - 25.0).abs() < 1e-9);
    assert_eq!(tracker.top(10, true).await.expect("allowed").len(), 1);

    // Day two: the same six actors again. observed == expected, raw score
    // zero, and links remember no peak, so the entry is removed outright.
    let day_two = day_one + Duration::days(1);
    for actor in 0..6 {
        tracker
            .record_use(&subject, actor, true, day_two)
            .await
            .expect("record");
    }
    tracker.calculate(day_two).await.expect("day two cycle");

    assert_eq!(set.rank_of(1).await.expect("rank"), None);
}

#[tokio::test]
async fn inappropriate_links_record_nothing() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let repo = Arc::new(MemoryLinkRepository::new());
    let tracker = Tracker::new(
        LinkKind::new(repo.clone()),
        Arc::clone(&store),
        Arc::new(StaticRecipients(vec![])),
        Arc::new(RecordingNotifier::default()),
    );

    let at = parse_utc("2025-11-08T12:00:00Z");
    let subject = link(1, false, true);
    repo.insert(subject.clone());
    tracker
        .record_use(&subject, 7, true, at)
        .await
        .expect("record is a no-op");

    let days = tracker.usage_history(1).last_7_days(at).await.expect("history");
    assert!(days.iter().all(|day| day.uses() == 0));

    let summary = tracker.calculate(at).await.expect("calculate");
    assert_eq!(summary.candidates, 0);
}

#[tokio::test]
async fn one_failed_recipient_does_not_block_the_rest() {
    let notifier = RecordingNotifier {
        sent: Mutex::new(Vec::new()),
        failing_handles: vec!["mod-a".to_string()],
    };
    let harness = tag_harness(vec![staff("mod-a"), staff("mod-b")], notifier);
    let at = parse_utc("2025-11-08T12:00:00Z");

    let subject = tag(1, false);
    harness.repo.insert(subject.clone());
    for actor in 0..6 {
        harness
            .tracker
            .record_use(&subject, actor, true, at)
            .await
            .expect("record");
    }

    let summary = harness.tracker.calculate(at).await.expect("calculate");
    assert_eq!(summary.notified, 1);
    assert_eq!(summary.notification_failures, 1);

    let sent = harness.notifier.sent();
    assert_eq!(sent, vec![("mod-b".to_string(), 1)]);
}

#[tokio::test]
async fn stale_ranked_ids_are_skipped_when_materializing() {
    let harness = tag_harness(vec![], RecordingNotifier::default());

    // A ranked id whose subject has since been deleted upstream.
    let set = tag_set(&harness.store);
    set.upsert_score(99, 5.0, false).await.expect("upsert");

    let subject = tag(1, false);
    harness.repo.insert(subject.clone());
    set.upsert_score(1, 3.0, false).await.expect("upsert");

    let listed = harness.tracker.top(10, false).await.expect("listing");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, 1);
}

#[tokio::test]
async fn reviewed_subjects_never_refire_notifications() {
    let harness = tag_harness(vec![staff("mod-a")], RecordingNotifier::default());
    let at = parse_utc("2025-11-08T12:00:00Z");

    let mut subject = tag(1, false);
    subject.review.reviewed_at = Some(at - Duration::days(3));
    harness.repo.insert(subject.clone());
    for actor in 0..6 {
        harness
            .tracker
            .record_use(&subject, actor, true, at)
            .await
            .expect("record");
    }

    let summary = harness.tracker.calculate(at).await.expect("calculate");
    assert_eq!(summary.notified, 0);
    assert!(harness.notifier.sent().is_empty());
}
