use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use prometheus::core::Collector;
use prometheus::{
    CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};

use super::{MetricFamily, MetricsSink};
use crate::aggregate::CountMap;
use crate::jellyfin::FetchError;

/// Namespace of the republished Jellyfin gauges.
const NAMESPACE: &str = "jellyfin";
/// Namespace of the exporter's own health metrics.
const SELF_NAMESPACE: &str = "jellyfin_exporter";

/// Prometheus registry holding the published gauges and the exporter's
/// own health metrics.
///
/// The registry is owned, not global, and carries no process collectors.
/// Each gauge family is rewritten under the exclusive side of
/// `publish_lock`; [`encode`](Self::encode) gathers under the shared side,
/// so a scrape never sees a family between its reset and its rewrite.
pub struct ExporterMetrics {
    registry: Registry,
    publish_lock: parking_lot::RwLock<()>,

    // === Published gauges ===
    media_count: GaugeVec,
    connected_clients: GaugeVec,
    stream_count: GaugeVec,

    // === Exporter health ===
    /// Jellyfin API requests by endpoint and status.
    pub requests_total: CounterVec,
    /// Jellyfin API request duration by endpoint.
    pub request_duration: HistogramVec,
    /// Failed refreshes by family and error kind.
    pub refresh_errors: CounterVec,
    /// Unix time of the last successful publish, by family.
    pub last_refresh: GaugeVec,
    /// Duration of full refresh cycles.
    pub refresh_duration: Histogram,
}

impl ExporterMetrics {
    /// Creates a new metrics instance with all metrics registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let family_gauge = |family: MetricFamily| {
            GaugeVec::new(
                Opts::new(family.as_str(), family.help()).namespace(NAMESPACE),
                &[family.label()],
            )
            .with_context(|| format!("creating {family} gauge"))
        };

        let media_count = family_gauge(MetricFamily::MediaCount)?;
        let connected_clients = family_gauge(MetricFamily::ConnectedClients)?;
        let stream_count = family_gauge(MetricFamily::Streams)?;

        let requests_total = CounterVec::new(
            Opts::new(
                "requests_total",
                "Total Jellyfin API requests by endpoint and status.",
            )
            .namespace(SELF_NAMESPACE),
            &["endpoint", "status"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "request_duration_seconds",
                "Jellyfin API request duration by endpoint.",
            )
            .namespace(SELF_NAMESPACE)
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["endpoint"],
        )?;
        let refresh_errors = CounterVec::new(
            Opts::new(
                "refresh_errors_total",
                "Total failed metric refreshes by family and error kind.",
            )
            .namespace(SELF_NAMESPACE),
            &["family", "kind"],
        )?;
        let last_refresh = GaugeVec::new(
            Opts::new(
                "last_refresh_timestamp_seconds",
                "Unix time of the last successful refresh by family.",
            )
            .namespace(SELF_NAMESPACE),
            &["family"],
        )?;
        let refresh_duration = Histogram::with_opts(
            HistogramOpts::new(
                "refresh_duration_seconds",
                "Time to fetch, aggregate and publish one refresh cycle.",
            )
            .namespace(SELF_NAMESPACE)
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;

        registry.register(Box::new(media_count.clone()))?;
        registry.register(Box::new(connected_clients.clone()))?;
        registry.register(Box::new(stream_count.clone()))?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(refresh_errors.clone()))?;
        registry.register(Box::new(last_refresh.clone()))?;
        registry.register(Box::new(refresh_duration.clone()))?;

        Ok(Self {
            registry,
            publish_lock: parking_lot::RwLock::new(()),
            media_count,
            connected_clients,
            stream_count,
            requests_total,
            request_duration,
            refresh_errors,
            last_refresh,
            refresh_duration,
        })
    }

    fn gauge(&self, family: MetricFamily) -> &GaugeVec {
        match family {
            MetricFamily::MediaCount => &self.media_count,
            MetricFamily::ConnectedClients => &self.connected_clients,
            MetricFamily::Streams => &self.stream_count,
        }
    }

    /// Reset and rewrite one family. Callers hold the write side of
    /// `publish_lock`.
    fn rewrite(&self, family: MetricFamily, counts: &CountMap) {
        let gauge = self.gauge(family);
        gauge.reset();
        for (label, count) in counts {
            gauge
                .with_label_values(&[label.as_str()])
                .set(*count as f64);
        }
    }

    fn mark_refreshed(&self, family: MetricFamily) {
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.last_refresh
            .with_label_values(&[family.as_str()])
            .set(now);
    }

    /// Record one Jellyfin API request.
    pub fn observe_request(&self, endpoint: &str, status: &str, duration: Duration) {
        self.requests_total
            .with_label_values(&[endpoint, status])
            .inc();
        self.request_duration
            .with_label_values(&[endpoint])
            .observe(duration.as_secs_f64());
    }

    /// Current values of one family, as last published.
    pub fn snapshot(&self, family: MetricFamily) -> CountMap {
        let _guard = self.publish_lock.read();
        let mut counts = CountMap::new();

        for mf in self.gauge(family).collect() {
            for metric in mf.get_metric() {
                let label = metric
                    .get_label()
                    .iter()
                    .find(|pair| pair.get_name() == family.label())
                    .map(|pair| pair.get_value().to_string());

                if let Some(label) = label {
                    counts.insert(label, metric.get_gauge().get_value() as u64);
                }
            }
        }

        counts
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let metric_families = {
            let _guard = self.publish_lock.read();
            self.registry.gather()
        };

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .context("encoding metrics")?;

        String::from_utf8(buffer).context("converting metrics to string")
    }
}

impl MetricsSink for ExporterMetrics {
    fn publish(&self, family: MetricFamily, counts: &CountMap) {
        {
            let _guard = self.publish_lock.write();
            self.rewrite(family, counts);
        }
        self.mark_refreshed(family);
    }

    fn publish_all(&self, families: &[(MetricFamily, &CountMap)]) {
        {
            let _guard = self.publish_lock.write();
            for (family, counts) in families {
                self.rewrite(*family, counts);
            }
        }
        for (family, _) in families {
            self.mark_refreshed(*family);
        }
    }

    fn record_failure(&self, family: MetricFamily, error: &FetchError) {
        self.refresh_errors
            .with_label_values(&[family.as_str(), error.kind()])
            .inc();
    }

    fn record_cycle(&self, duration: Duration) {
        self.refresh_duration.observe(duration.as_secs_f64());
    }
}
