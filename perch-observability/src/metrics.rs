use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Metrics collector. Every counter is gated behind `enabled`.
///
/// When disabled no prometheus registry exists and every `record_*` call
/// returns immediately.
pub struct MetricsCollector {
    enabled: bool,
    registry: Option<Registry>,
    pub dispatch_requests_total: Option<IntCounterVec>,
    pub dispatch_duration: Option<HistogramVec>,
    pub rate_limited_total: Option<IntCounterVec>,
    pub limiter_buckets: Option<IntGauge>,
}

impl MetricsCollector {
    /// Create a new collector. When `enabled = false`, everything is None.
    pub fn new(enabled: bool) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let registry = Registry::new();

        let dispatch_requests_total = IntCounterVec::new(
            Opts::new("dispatch_requests_total", "Plugin requests dispatched").namespace("perch"),
            &["plugin", "transport", "status"],
        )?;

        let dispatch_duration = HistogramVec::new(
            HistogramOpts::new("dispatch_duration_seconds", "Plugin dispatch latency")
                .namespace("perch")
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ]),
            &["plugin"],
        )?;

        let rate_limited_total = IntCounterVec::new(
            Opts::new("rate_limited_total", "Requests rejected by plugin quotas").namespace("perch"),
            &["plugin"],
        )?;

        let limiter_buckets = IntGauge::with_opts(
            Opts::new("limiter_buckets", "Live rate-limit buckets").namespace("perch"),
        )?;

        registry.register(Box::new(dispatch_requests_total.clone()))?;
        registry.register(Box::new(dispatch_duration.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        registry.register(Box::new(limiter_buckets.clone()))?;

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            dispatch_requests_total: Some(dispatch_requests_total),
            dispatch_duration: Some(dispatch_duration),
            rate_limited_total: Some(rate_limited_total),
            limiter_buckets: Some(limiter_buckets),
        })
    }

    /// No-op collector.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            registry: None,
            dispatch_requests_total: None,
            dispatch_duration: None,
            rate_limited_total: None,
            limiter_buckets: None,
        }
    }

    /// Record one dispatched request (no-op when disabled).
    #[inline]
    pub fn record_dispatch(&self, plugin: &str, transport: &str, status: u16, duration_secs: f64) {
        if !self.enabled {
            return;
        }
        if let Some(ref counter) = self.dispatch_requests_total {
            let mut buf = itoa::Buffer::new();
            let status_str = buf.format(status);
            counter
                .with_label_values(&[plugin, transport, status_str])
                .inc();
        }
        if let Some(ref hist) = self.dispatch_duration {
            hist.with_label_values(&[plugin]).observe(duration_secs);
        }
    }

    #[inline]
    pub fn record_rate_limited(&self, plugin: &str) {
        if let Some(ref counter) = self.rate_limited_total {
            counter.with_label_values(&[plugin]).inc();
        }
    }

    pub fn set_limiter_buckets(&self, count: usize) {
        if let Some(ref gauge) = self.limiter_buckets {
            gauge.set(i64::try_from(count).unwrap_or(i64::MAX));
        }
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        if let Some(ref registry) = self.registry {
            let encoder = TextEncoder::new();
            let metric_families = registry.gather();
            let mut buffer = Vec::new();
            encoder.encode(&metric_families, &mut buffer).unwrap_or(());
            String::from_utf8(buffer).unwrap_or_default()
        } else {
            String::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Disabled collector ───────────────────────────────────────

    #[test]
    fn disabled_collector_has_no_fields() {
        let mc = MetricsCollector::new(false).unwrap();
        assert!(!mc.is_enabled());
        assert!(mc.dispatch_requests_total.is_none());
        assert!(mc.dispatch_duration.is_none());
        assert!(mc.rate_limited_total.is_none());
        assert!(mc.limiter_buckets.is_none());
    }

    #[test]
    fn disabled_collector_is_silent() {
        let mc = MetricsCollector::disabled();
        mc.record_dispatch("stats", "unary", 200, 0.01);
        mc.record_rate_limited("stats");
        mc.set_limiter_buckets(3);
        assert_eq!(mc.render(), "");
    }

    // ── Enabled collector ────────────────────────────────────────

    #[test]
    fn enabled_collector_renders_dispatch_counters() {
        let mc = MetricsCollector::new(true).unwrap();
        mc.record_dispatch("stats", "unary", 201, 0.02);
        mc.record_dispatch("stats", "unary", 201, 0.03);
        let text = mc.render();
        assert!(text.contains("perch_dispatch_requests_total"));
        assert!(text.contains(r#"plugin="stats""#));
        assert!(text.contains(r#"status="201""#));
        assert!(text.contains("perch_dispatch_duration_seconds"));
    }

    #[test]
    fn enabled_collector_tracks_rejections_and_buckets() {
        let mc = MetricsCollector::new(true).unwrap();
        mc.record_rate_limited("stats");
        mc.set_limiter_buckets(42);
        let text = mc.render();
        assert!(text.contains("perch_rate_limited_total"));
        assert!(text.contains("perch_limiter_buckets 42"));
    }

    #[test]
    fn independent_collectors_do_not_conflict() {
        // Each collector owns its registry, so duplicate names are fine
        let a = MetricsCollector::new(true).unwrap();
        let b = MetricsCollector::new(true).unwrap();
        a.record_rate_limited("x");
        assert!(!b.render().contains(r#"plugin="x""#));
    }
}
