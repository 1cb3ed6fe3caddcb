use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::observability::Telemetry;
use crate::trending::kind::{LinkKind, TagKind};
use crate::trending::tracker::{CycleSummary, Tracker};

#[derive(Debug, Clone, Copy)]
pub struct JobContext {
    pub(crate) job_id: Uuid,
    pub(crate) at: DateTime<Utc>,
}

impl JobContext {
    pub fn new(job_id: Uuid, at: DateTime<Utc>) -> Self {
        Self { job_id, at }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RefreshOutcome {
    Completed {
        tags: CycleSummary,
        links: CycleSummary,
    },
    /// Another refresh held the single-flight guard.
    AlreadyRunning,
}

/// Owns both trackers and serializes recomputation cycles.
///
/// The two-pass calculation reads ranks it wrote moments earlier, so two
/// concurrent cycles over the same ranked sets would corrupt each other's
/// view; `try_lock` makes overlapping requests skip instead of queue.
#[derive(Clone)]
pub struct Scheduler {
    tags: Arc<Tracker<TagKind>>,
    links: Arc<Tracker<LinkKind>>,
    telemetry: Telemetry,
    refresh_guard: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(
        tags: Arc<Tracker<TagKind>>,
        links: Arc<Tracker<LinkKind>>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            tags,
            links,
            telemetry,
            refresh_guard: Arc::new(Mutex::new(())),
        }
    }

    pub async fn run_refresh(&self, context: JobContext) -> Result<RefreshOutcome> {
        let Ok(_guard) = self.refresh_guard.try_lock() else {
            tracing::info!(job_id = %context.job_id, "refresh already in flight, skipping");
            return Ok(RefreshOutcome::AlreadyRunning);
        };

        tracing::info!(job_id = %context.job_id, at = %context.at.to_rfc3339(), "running trend refresh");
        let timer = self.telemetry.metrics().refresh_duration.start_timer();

        let result = async {
            let tags = self.tags.calculate(context.at).await?;
            let links = self.links.calculate(context.at).await?;
            Ok::<_, anyhow::Error>((tags, links))
        }
        .await;

        timer.observe_duration();

        match result {
            Ok((tags, links)) => {
                self.telemetry.record_refresh(&tags, &links);
                self.record_set_sizes().await;
                Ok(RefreshOutcome::Completed { tags, links })
            }
            Err(error) => {
                tracing::error!(job_id = %context.job_id, error = %error, "trend refresh failed");
                self.telemetry.metrics().refresh_failures.inc();
                Err(error)
            }
        }
    }

    async fn record_set_sizes(&self) {
        let metrics = self.telemetry.metrics();
        if let Ok((all, allowed)) = self.tags.set_sizes().await {
            metrics.tag_set_size.set(all as f64);
            metrics.tag_allowed_set_size.set(allowed as f64);
        }
        if let Ok((all, allowed)) = self.links.set_sizes().await {
            metrics.link_set_size.set(all as f64);
            metrics.link_allowed_set_size.set(allowed as f64);
        }
    }

    pub fn tags(&self) -> &Arc<Tracker<TagKind>> {
        &self.tags
    }

    pub fn links(&self) -> &Arc<Tracker<LinkKind>> {
        &self.links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Telemetry;
    use crate::store::Store;
    use crate::store::memory::MemoryStore;
    use crate::subject::repository::{
        MemoryLinkRepository, MemoryTagRepository, RecipientDirectory, StaticRecipients,
    };
    use crate::trending::notifier::{LogNotifier, ReviewNotifier};

    fn scheduler() -> Scheduler {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let recipients: Arc<dyn RecipientDirectory> = Arc::new(StaticRecipients(Vec::new()));
        let notifier: Arc<dyn ReviewNotifier> = Arc::new(LogNotifier);

        let tags = Arc::new(Tracker::new(
            TagKind::new(Arc::new(MemoryTagRepository::new())),
            Arc::clone(&store),
            Arc::clone(&recipients),
            Arc::clone(&notifier),
        ));
        let links = Arc::new(Tracker::new(
            LinkKind::new(Arc::new(MemoryLinkRepository::new())),
            store,
            recipients,
            notifier,
        ));

        Scheduler::new(tags, links, Telemetry::new().expect("telemetry builds"))
    }

    #[tokio::test]
    async fn an_in_flight_refresh_makes_overlapping_requests_skip() {
        let scheduler = scheduler();
        let _held = scheduler.refresh_guard.lock().await;

        let outcome = scheduler
            .run_refresh(JobContext::new(Uuid::new_v4(), Utc::now()))
            .await
            .expect("refresh resolves");
        assert!(matches!(outcome, RefreshOutcome::AlreadyRunning));
    }

    #[tokio::test]
    async fn the_guard_is_released_between_cycles() {
        let scheduler = scheduler();
        for _ in 0..2 {
            let outcome = scheduler
                .run_refresh(JobContext::new(Uuid::new_v4(), Utc::now()))
                .await
                .expect("refresh resolves");
            assert!(matches!(outcome, RefreshOutcome::Completed { .. }));
        }
    }
}
