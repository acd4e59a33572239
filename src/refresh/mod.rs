//! Periodic fetch, aggregate and publish loop.
//!
//! One cycle issues the session and library-count requests concurrently.
//! The families fed by one request are published together, and a failed
//! request skips only the families it feeds; their previous values stay
//! published until a later cycle succeeds. Cycles never overlap: the next
//! one starts one interval after the previous one finished.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::activity::Thresholds;
use crate::aggregate::{self, CountMap};
use crate::clock::Clock;
use crate::export::{MetricFamily, MetricsSink};
use crate::jellyfin::{FetchError, MediaServer};

/// Outcome of refreshing the families fed by one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Published; carries the number of labels written per family.
    Published(Vec<(MetricFamily, usize)>),
    /// The request failed; carries the error kind.
    Failed(&'static str),
}

impl Outcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}

/// What one refresh cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// `stream_count` and `connected_clients_count`, fed by `/Sessions`.
    pub sessions: Outcome,
    /// `media_count`, fed by `/Items/Counts`.
    pub media: Outcome,
}

/// Drives refresh cycles against a media server and a metrics sink.
pub struct Refresher<S, K> {
    server: Arc<S>,
    sink: Arc<K>,
    clock: Arc<dyn Clock>,
    thresholds: Thresholds,
    interval: Duration,
}

impl<S, K> Refresher<S, K>
where
    S: MediaServer + 'static,
    K: MetricsSink + 'static,
{
    pub fn new(
        server: Arc<S>,
        sink: Arc<K>,
        clock: Arc<dyn Clock>,
        thresholds: Thresholds,
        interval: Duration,
    ) -> Self {
        Self {
            server,
            sink,
            clock,
            thresholds,
            interval,
        }
    }

    /// Run one fetch, aggregate and publish cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();

        let (sessions, counts) = tokio::join!(
            self.server.fetch_sessions(),
            self.server.fetch_library_counts(),
        );

        let sessions = match sessions {
            Ok(sessions) => {
                let summary =
                    aggregate::summarize_sessions(&sessions, self.clock.now(), &self.thresholds);
                debug!(
                    sessions = sessions.len(),
                    streaming_users = summary.streams.len(),
                    connected_users = summary.connected.len(),
                    "aggregated sessions",
                );

                self.sink.publish_all(&[
                    (MetricFamily::Streams, &summary.streams),
                    (MetricFamily::ConnectedClients, &summary.connected),
                ]);

                Outcome::Published(vec![
                    (MetricFamily::Streams, summary.streams.len()),
                    (MetricFamily::ConnectedClients, summary.connected.len()),
                ])
            }
            Err(e) => self.fail(
                "sessions",
                &[MetricFamily::Streams, MetricFamily::ConnectedClients],
                &e,
            ),
        };

        let media = match counts {
            Ok(counts) => Outcome::Published(vec![self.publish(
                MetricFamily::MediaCount,
                &aggregate::media_counts(&counts),
            )]),
            Err(e) => self.fail("item_counts", &[MetricFamily::MediaCount], &e),
        };

        self.sink.record_cycle(start.elapsed());

        CycleReport { sessions, media }
    }

    fn publish(&self, family: MetricFamily, counts: &CountMap) -> (MetricFamily, usize) {
        self.sink.publish(family, counts);
        (family, counts.len())
    }

    fn fail(&self, source: &str, families: &[MetricFamily], err: &FetchError) -> Outcome {
        for family in families {
            error!(
                source,
                family = %family,
                kind = err.kind(),
                error = %err,
                "failed to refresh metric family, keeping previous values",
            );
            self.sink.record_failure(*family, err);
        }

        Outcome::Failed(err.kind())
    }

    /// Run cycles until `cancel` fires. The first cycle starts at once;
    /// each later one starts `interval` after the previous one completed.
    /// Cancellation also abandons an in-flight cycle.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = ?self.interval, "refresh loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                report = self.run_cycle() => {
                    debug!(
                        sessions_ok = report.sessions.is_published(),
                        media_ok = report.media.is_published(),
                        "refresh cycle complete",
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("refresh loop stopped");
    }

    /// Spawn [`run`](Self::run) onto the tokio runtime.
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
