pub mod metrics;
pub mod server;

use std::time::Duration;

use crate::aggregate::CountMap;
use crate::jellyfin::FetchError;

pub use metrics::ExporterMetrics;
pub use server::MetricsServer;

/// The published gauge families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricFamily {
    /// `jellyfin_media_count{type}`.
    MediaCount,
    /// `jellyfin_connected_clients_count{username}`.
    ConnectedClients,
    /// `jellyfin_stream_count{username}`.
    Streams,
}

impl MetricFamily {
    /// Short name used in logs and self-metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MediaCount => "media_count",
            Self::ConnectedClients => "connected_clients_count",
            Self::Streams => "stream_count",
        }
    }

    /// Name of the family's single label.
    pub fn label(self) -> &'static str {
        match self {
            Self::MediaCount => "type",
            Self::ConnectedClients | Self::Streams => "username",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Self::MediaCount => "Media count by type",
            Self::ConnectedClients => "Connected clients by username",
            Self::Streams => "Actively playing streams by username",
        }
    }
}

impl std::fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for aggregated count maps.
///
/// `publish` replaces the whole family: labels missing from `counts`
/// disappear. Readers must never observe a partially replaced family.
pub trait MetricsSink: Send + Sync {
    /// Replace every value of `family` with `counts`.
    fn publish(&self, family: MetricFamily, counts: &CountMap);

    /// Replace several families as one unit, so readers see all of them
    /// from the same cycle.
    fn publish_all(&self, families: &[(MetricFamily, &CountMap)]) {
        for (family, counts) in families {
            self.publish(*family, counts);
        }
    }

    /// Note that `family` could not be refreshed this cycle.
    fn record_failure(&self, _family: MetricFamily, _error: &FetchError) {}

    /// Note how long a full refresh cycle took.
    fn record_cycle(&self, _duration: Duration) {}
}
