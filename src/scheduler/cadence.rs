use chrono::{DateTime, Duration, Utc};

/// Fixed-interval cadence aligned to interval boundaries since the Unix
/// epoch, so every worker replica computes the same schedule.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IntervalCadence {
    every_secs: i64,
}

impl IntervalCadence {
    pub(crate) fn new(every_secs: u64) -> Self {
        assert!(every_secs > 0, "cadence interval must be positive");
        Self {
            every_secs: every_secs as i64,
        }
    }

    /// First aligned instant at or after `now`.
    pub(crate) fn next_run_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ts = now.timestamp();
        let remainder = ts.rem_euclid(self.every_secs);
        if remainder == 0 && now.timestamp_subsec_nanos() == 0 {
            now
        } else {
            DateTime::from_timestamp(ts - remainder, 0).unwrap_or(now) + Duration::seconds(self.every_secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IntervalCadence;
    use chrono::{DateTime, Utc};

    fn parse_utc(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn next_run_rounds_up_to_the_next_boundary() {
        let cadence = IntervalCadence::new(300);
        let now = parse_utc("2025-11-08T10:02:17Z");
        assert_eq!(cadence.next_run_from(now), parse_utc("2025-11-08T10:05:00Z"));
    }

    #[test]
    fn next_run_is_immediate_on_a_boundary() {
        let cadence = IntervalCadence::new(300);
        let now = parse_utc("2025-11-08T10:05:00Z");
        assert_eq!(cadence.next_run_from(now), now);
    }

    #[test]
    fn replicas_agree_on_the_schedule() {
        let cadence = IntervalCadence::new(300);
        let a = cadence.next_run_from(parse_utc("2025-11-08T10:00:01Z"));
        let b = cadence.next_run_from(parse_utc("2025-11-08T10:04:59Z"));
        assert_eq!(a, b);
    }
}
