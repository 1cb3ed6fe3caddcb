/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub uses_recorded: Counter,
    pub refresh_cycles: Counter,
    pub refresh_failures: Counter,
    pub subjects_scored: Counter,
    pub review_notifications_sent: Counter,
    pub review_notification_failures: Counter,

    // ヒストグラム
    pub refresh_duration: Histogram,

    // ゲージ
    pub tag_set_size: Gauge,
    pub tag_allowed_set_size: Gauge,
    pub link_set_size: Gauge,
    pub link_allowed_set_size: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    pub fn new(registry: &Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            uses_recorded: register_counter_with_registry!(
                "trends_uses_recorded_total",
                "Total number of usage events recorded",
                registry
            )?,
            refresh_cycles: register_counter_with_registry!(
                "trends_refresh_cycles_total",
                "Total number of completed trend refresh cycles",
                registry
            )?,
            refresh_failures: register_counter_with_registry!(
                "trends_refresh_failures_total",
                "Total number of failed trend refresh cycles",
                registry
            )?,
            subjects_scored: register_counter_with_registry!(
                "trends_subjects_scored_total",
                "Total number of candidate subjects scored",
                registry
            )?,
            review_notifications_sent: register_counter_with_registry!(
                "trends_review_notifications_sent_total",
                "Total number of review notifications dispatched",
                registry
            )?,
            review_notification_failures: register_counter_with_registry!(
                "trends_review_notification_failures_total",
                "Total number of review notification dispatch failures",
                registry
            )?,
            refresh_duration: register_histogram_with_registry!(
                "trends_refresh_duration_seconds",
                "Duration of one trend refresh cycle",
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
                registry
            )?,
            tag_set_size: register_gauge_with_registry!(
                "trends_tag_set_size",
                "Number of entries in the tag `all` ranked set",
                registry
            )?,
            tag_allowed_set_size: register_gauge_with_registry!(
                "trends_tag_allowed_set_size",
                "Number of entries in the tag `allowed` ranked set",
                registry
            )?,
            link_set_size: register_gauge_with_registry!(
                "trends_link_set_size",
                "Number of entries in the link `all` ranked set",
                registry
            )?,
            link_allowed_set_size: register_gauge_with_registry!(
                "trends_link_allowed_set_size",
                "Number of entries in the link `allowed` ranked set",
                registry
            )?,
        })
    }
}
