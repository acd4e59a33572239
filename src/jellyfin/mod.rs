pub mod error;
pub mod model;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{AuthScheme, JellyfinConfig};

pub use error::FetchError;
pub use model::{LibraryCounts, ServerInfo, SessionRecord};

const SESSIONS_PATH: &str = "/Sessions";
const COUNTS_PATH: &str = "/Items/Counts";
const SYSTEM_INFO_PATH: &str = "/System/Info";

/// Callback type for recording API request metrics.
pub type MetricsCallback = Box<dyn Fn(&str, &str, Duration) + Send + Sync>;

/// Jellyfin API client trait.
pub trait MediaServer: Send + Sync {
    /// Fetch the current session list.
    fn fetch_sessions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<SessionRecord>, FetchError>> + Send;

    /// Fetch library item counts.
    fn fetch_library_counts(
        &self,
    ) -> impl std::future::Future<Output = Result<LibraryCounts, FetchError>> + Send;

    /// Fetch server identity. Requires a valid token, so it doubles as the
    /// startup credential check.
    fn fetch_server_info(
        &self,
    ) -> impl std::future::Future<Output = Result<ServerInfo, FetchError>> + Send;
}

/// HTTP-based Jellyfin API client.
pub struct Client {
    http: reqwest::Client,
    host: String,
    token: String,
    auth: AuthScheme,
    metrics: Option<MetricsCallback>,
}

impl Client {
    /// Create a new Jellyfin client.
    pub fn new(cfg: &JellyfinConfig) -> Result<Self> {
        let timeout = if cfg.timeout.is_zero() {
            Duration::from_secs(30)
        } else {
            cfg.timeout
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("jelly-metrics/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            host: cfg.host.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            auth: cfg.auth,
            metrics: None,
        })
    }

    /// Set a metrics callback for recording request stats.
    /// The callback receives (endpoint_name, status, duration).
    pub fn with_metrics(mut self, cb: MetricsCallback) -> Self {
        self.metrics = Some(cb);
        self
    }

    fn record_request(&self, endpoint: &str, status: &str, duration: Duration) {
        if let Some(ref cb) = self.metrics {
            cb(endpoint, status, duration);
        }
    }

    /// Perform an authenticated GET and decode the JSON body, recording
    /// the outcome under the endpoint's short name.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let start = Instant::now();
        let result = self.send_get(path).await;

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        self.record_request(endpoint_from_path(path), status, start.elapsed());

        result
    }

    async fn send_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{}", self.host, path);

        let request = self.http.get(&url).header(ACCEPT, "application/json");
        let request = match self.auth {
            AuthScheme::Header => request.header(
                AUTHORIZATION,
                format!("MediaBrowser Token=\"{}\"", self.token),
            ),
            AuthScheme::Query => request.query(&[("ApiKey", self.token.as_str())]),
        };

        // URLs are stripped from transport errors: with query auth they
        // carry the token.
        let response = request.send().await.map_err(|e| FetchError::Technical {
            path: path.to_string(),
            source: e.without_url(),
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FetchError::InvalidToken);
        }
        if !status.is_success() {
            return Err(FetchError::UnknownApi {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Technical {
            path: path.to_string(),
            source: e.without_url(),
        })?;

        serde_json::from_slice(&body).map_err(|e| FetchError::UnknownResponse {
            path: path.to_string(),
            source: e,
        })
    }
}

/// Extract a short endpoint name from an API path.
fn endpoint_from_path(path: &str) -> &'static str {
    match path {
        SESSIONS_PATH => "sessions",
        COUNTS_PATH => "item_counts",
        SYSTEM_INFO_PATH => "system_info",
        _ => "other",
    }
}

impl MediaServer for Client {
    async fn fetch_sessions(&self) -> Result<Vec<SessionRecord>, FetchError> {
        debug!("fetching sessions");
        self.get_json(SESSIONS_PATH).await
    }

    async fn fetch_library_counts(&self) -> Result<LibraryCounts, FetchError> {
        debug!("fetching library counts");
        self.get_json(COUNTS_PATH).await
    }

    async fn fetch_server_info(&self) -> Result<ServerInfo, FetchError> {
        debug!("fetching server info");
        self.get_json(SYSTEM_INFO_PATH).await
    }
}
