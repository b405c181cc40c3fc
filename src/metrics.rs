//! Prometheus registry.
//!
//! Mirrors the teacher's `metrics.rs` shape (one `Registry`, one struct of
//! typed collectors, a `render()` that runs the `TextEncoder`) with the
//! collector set swapped for this service's own signals: per-stage timing
//! histograms, per-feed item counters, and the searchable/nonsearchable/
//! verification-age gauges the sampler (§4.8) maintains.

use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    pub stage_duration_seconds: HistogramVec,
    pub items_pushed_total: IntCounterVec,

    pub searchable_total: IntGauge,
    pub nonsearchable_total: IntGauge,
    pub feed_searchable_total: IntGaugeVec,
    pub feed_nonsearchable_total: IntGaugeVec,
    pub verification_age_seconds: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let stage_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "ingest_stage_duration_seconds",
                "Duration of one ingest pipeline stage",
            ),
            &["feed_id", "ingest_type", "stage"],
        )
        .expect("valid histogram opts");

        let items_pushed_total = IntCounterVec::new(
            prometheus::Opts::new("ingest_items_pushed_total", "Items bulk-pushed per feed"),
            &["feed_id"],
        )
        .expect("valid counter opts");

        let searchable_total =
            IntGauge::new("search_searchable_total", "Document count behind the alias")
                .expect("valid gauge opts");
        let nonsearchable_total = IntGauge::new(
            "search_nonsearchable_total",
            "Document count in indexes outside the alias",
        )
        .expect("valid gauge opts");
        let feed_searchable_total = IntGaugeVec::new(
            prometheus::Opts::new("search_feed_searchable_total", "Per-feed searchable count"),
            &["feed_id"],
        )
        .expect("valid gauge opts");
        let feed_nonsearchable_total = IntGaugeVec::new(
            prometheus::Opts::new(
                "search_feed_nonsearchable_total",
                "Per-feed nonsearchable count",
            ),
            &["feed_id"],
        )
        .expect("valid gauge opts");
        let verification_age_seconds = IntGauge::new(
            "search_verification_age_seconds",
            "Age of the most recent verification activity",
        )
        .expect("valid gauge opts");

        registry
            .register(Box::new(stage_duration_seconds.clone()))
            .expect("unique metric name");
        registry
            .register(Box::new(items_pushed_total.clone()))
            .expect("unique metric name");
        registry
            .register(Box::new(searchable_total.clone()))
            .expect("unique metric name");
        registry
            .register(Box::new(nonsearchable_total.clone()))
            .expect("unique metric name");
        registry
            .register(Box::new(feed_searchable_total.clone()))
            .expect("unique metric name");
        registry
            .register(Box::new(feed_nonsearchable_total.clone()))
            .expect("unique metric name");
        registry
            .register(Box::new(verification_age_seconds.clone()))
            .expect("unique metric name");

        Self {
            registry,
            stage_duration_seconds,
            items_pushed_total,
            searchable_total,
            nonsearchable_total,
            feed_searchable_total,
            feed_nonsearchable_total,
            verification_age_seconds,
        }
    }

    /// Render the current snapshot as Prometheus text exposition format —
    /// this is what gets `SET metrics` in the KV store and served at
    /// `GET /metrics`.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .expect("prometheus text encoding never fails for valid metric families");
        String::from_utf8(buffer).expect("prometheus text output is always valid utf8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metric_names() {
        let metrics = Metrics::new();
        metrics.searchable_total.set(42);
        let rendered = metrics.render();
        assert!(rendered.contains("search_searchable_total 42"));
    }
}
