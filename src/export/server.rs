use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

use super::ExporterMetrics;

/// Deadline for serving one request. Slower requests get 408.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const DEFAULT_LISTEN_ADDR: &str = ":8097";

/// Exposition endpoint for the published gauges.
///
/// Handlers only read the registry; they never reach out to Jellyfin.
pub struct MetricsServer {
    listen_addr: String,
    cancel: parking_lot::Mutex<Option<CancellationToken>>,
}

impl MetricsServer {
    pub fn new(listen_addr: &str) -> Self {
        Self {
            listen_addr: listen_addr.to_string(),
            cancel: parking_lot::Mutex::new(None),
        }
    }

    /// Bind and serve `/metrics` and `/healthz` on a background task.
    ///
    /// Returns the bound address; with port 0 this is the port the OS
    /// picked.
    pub async fn start(&self, metrics: Arc<ExporterMetrics>) -> Result<SocketAddr> {
        let bind_addr = bind_addr(&self.listen_addr);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("binding metrics listener on {bind_addr}"))?;
        let local_addr = listener.local_addr().context("reading bound address")?;

        let cancel = CancellationToken::new();
        *self.cancel.lock() = Some(cancel.clone());

        tokio::spawn(serve(listener, exposition_router(metrics), cancel));
        info!(addr = %local_addr, "serving prometheus metrics");

        Ok(local_addr)
    }

    /// Stop accepting connections and let in-flight scrapes finish.
    pub async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }

        Ok(())
    }
}

/// Resolve the configured listen address. `":port"` binds every interface.
fn bind_addr(listen_addr: &str) -> String {
    let addr = if listen_addr.is_empty() {
        DEFAULT_LISTEN_ADDR
    } else {
        listen_addr
    };

    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    }
}

async fn serve(listener: TcpListener, app: Router, cancel: CancellationToken) {
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await;

    match result {
        Ok(()) => info!("metrics server stopped"),
        Err(e) => error!(error = %e, "metrics server failed"),
    }
}

fn exposition_router(metrics: Arc<ExporterMetrics>) -> Router {
    let routes = Router::new()
        .route("/metrics", get(scrape))
        .route("/healthz", get(healthz))
        .with_state(metrics);

    with_deadline(routes, REQUEST_TIMEOUT)
}

fn with_deadline(router: Router, timeout: Duration) -> Router {
    router.layer(TimeoutLayer::new(timeout))
}

/// GET /metrics
async fn scrape(State(metrics): State<Arc<ExporterMetrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "rendering metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics").into_response()
        }
    }
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::CountMap;
    use crate::export::{MetricFamily, MetricsSink};

    #[test]
    fn test_bind_addr() {
        assert_eq!(bind_addr(":9100"), "0.0.0.0:9100");
        assert_eq!(bind_addr(""), "0.0.0.0:8097");
        assert_eq!(bind_addr("127.0.0.1:0"), "127.0.0.1:0");
    }

    #[tokio::test]
    async fn test_serves_metrics_and_healthz() {
        let metrics = Arc::new(ExporterMetrics::new().expect("metrics"));
        let counts: CountMap = [("alice".to_string(), 2)].into_iter().collect();
        metrics.publish(MetricFamily::Streams, &counts);

        let server = MetricsServer::new("127.0.0.1:0");
        let addr = server.start(Arc::clone(&metrics)).await.expect("start");

        let resp = reqwest::get(format!("http://{addr}/metrics"))
            .await
            .expect("scrape");
        assert_eq!(
            resp.headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some(prometheus::TEXT_FORMAT)
        );
        let body = resp.text().await.expect("body");
        assert!(body.contains("jellyfin_stream_count{username=\"alice\"} 2"));

        let health = reqwest::get(format!("http://{addr}/healthz"))
            .await
            .expect("healthz")
            .text()
            .await
            .expect("body");
        assert_eq!(health, "ok");

        server.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn test_slow_request_hits_deadline() {
        let slow = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let app = with_deadline(slow, Duration::from_millis(50));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let cancel = CancellationToken::new();
        let task = tokio::spawn(serve(listener, app, cancel.clone()));

        let started = std::time::Instant::now();
        let resp = reqwest::get(format!("http://{addr}/slow"))
            .await
            .expect("request");
        assert_eq!(resp.status(), reqwest::StatusCode::REQUEST_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(5));

        cancel.cancel();
        task.await.expect("server task");
    }
}
