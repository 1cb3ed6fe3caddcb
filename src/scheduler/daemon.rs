use std::time::Duration;

use chrono::Utc;
use tokio::{task::JoinHandle, time::sleep};
use tracing::{error, info};
use uuid::Uuid;

use crate::scheduler::{JobContext, Scheduler, cadence::IntervalCadence};

pub fn spawn_refresh_daemon(scheduler: Scheduler, every_secs: u64) -> JoinHandle<()> {
    let cadence = IntervalCadence::new(every_secs);
    RefreshDaemon { scheduler, cadence }.spawn()
}

struct RefreshDaemon {
    scheduler: Scheduler,
    cadence: IntervalCadence,
}

impl RefreshDaemon {
    fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        loop {
            let now = Utc::now();
            let next = self.cadence.next_run_from(now);
            let wait = duration_until(next, now);
            info!(
                next_run_utc = %next.to_rfc3339(),
                wait_seconds = wait.as_secs(),
                "scheduled trend refresh"
            );
            sleep(wait).await;

            let job_id = Uuid::new_v4();
            let job = JobContext::new(job_id, Utc::now());
            match self.scheduler.run_refresh(job).await {
                Ok(_) => info!(%job_id, "scheduled trend refresh completed"),
                Err(err) => error!(%job_id, error = %err, "scheduled trend refresh failed"),
            }

            // Never rerun within the same boundary instant.
            sleep(Duration::from_secs(1)).await;
        }
    }
}

fn duration_until(next: chrono::DateTime<Utc>, now: chrono::DateTime<Utc>) -> Duration {
    match (next - now).to_std() {
        Ok(duration) => duration,
        Err(_) => Duration::from_secs(0),
    }
}
