//! The trending engine: ranked sets, the per-kind capability adapters, the
//! anomaly/decay score calculator and the one-time review notification pass.

pub mod kind;
pub mod notifier;
pub mod set;
pub mod tracker;

use std::time::Duration;

/// Minimum distinct actors on the observed day before a subject can score at
/// all. Suppresses noise from very small absolute activity.
pub const THRESHOLD: f64 = 5.0;

/// A candidate whose rank in `all` is at or above (<=) this value triggers
/// the one-time review notification.
pub const REVIEW_THRESHOLD: u64 = 10;

/// A peak score older than this is forgotten before comparing against the
/// current raw score.
pub const MAX_SCORE_COOLDOWN_SECS: i64 = 2 * 24 * 60 * 60;

/// Half-life of the exponential decay applied to tag scores after a peak.
pub const MAX_SCORE_HALFLIFE_SECS: i64 = 2 * 60 * 60;

/// Entries scoring strictly below this are trimmed from both ranked sets at
/// the end of every cycle.
pub const SCORE_LOW_WATERMARK: f64 = 0.3;

/// Lifetime of the used-today membership set.
pub const USED_TODAY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Minimum gap between two `last_used_at` writes for the same tag.
pub const LAST_USED_THROTTLE_SECS: i64 = 12 * 60 * 60;
