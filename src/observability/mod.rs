pub(crate) mod metrics;
pub(crate) mod tracing;

use std::sync::Arc;

use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder};

use self::metrics::Metrics;
use crate::trending::tracker::CycleSummary;

/// Telemetry（メトリクスとトレーシング）を管理する構造体。
#[derive(Debug, Clone)]
pub struct Telemetry {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
}

impl Telemetry {
    /// 新しいTelemetryインスタンスを作成し、トレーシングとメトリクスを初期化する。
    ///
    /// # Errors
    /// トレーシングまたはメトリクスの初期化に失敗した場合はエラーを返す。
    pub fn new() -> Result<Self> {
        tracing::init()?;
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(Metrics::new(&registry)?);
        Ok(Self { registry, metrics })
    }

    /// メトリクスへのアクセスを提供する。
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// 1回の使用イベント記録を計上する。
    pub fn record_use(&self) {
        self.metrics.uses_recorded.inc();
    }

    /// 1回の再計算サイクルの結果を計上する。
    pub fn record_refresh(&self, tags: &CycleSummary, links: &CycleSummary) {
        self.metrics.refresh_cycles.inc();
        self.metrics
            .subjects_scored
            .inc_by((tags.scored + links.scored) as f64);
        self.metrics
            .review_notifications_sent
            .inc_by((tags.notified + links.notified) as f64);
        self.metrics
            .review_notification_failures
            .inc_by((tags.notification_failures + links.notification_failures) as f64);
    }

    /// Prometheusメトリクスをレンダリングする。
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_summaries_roll_up_into_counters() {
        let telemetry = Telemetry::new().expect("telemetry builds");
        let tags = CycleSummary {
            candidates: 3,
            scored: 3,
            notified: 2,
            notification_failures: 1,
            trimmed: 0,
        };
        let links = CycleSummary::default();

        telemetry.record_refresh(&tags, &links);
        telemetry.record_use();

        let rendered = telemetry.render_prometheus();
        assert!(rendered.contains("trends_refresh_cycles_total 1"));
        assert!(rendered.contains("trends_subjects_scored_total 3"));
        assert!(rendered.contains("trends_review_notifications_sent_total 2"));
        assert!(rendered.contains("trends_uses_recorded_total 1"));
    }
}
