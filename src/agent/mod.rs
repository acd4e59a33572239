use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::clock::SystemClock;
use crate::config::Config;
use crate::export::{ExporterMetrics, MetricsServer};
use crate::jellyfin::{self, FetchError, MediaServer, ServerInfo};
use crate::refresh::Refresher;

/// Agent orchestrates all components: Jellyfin client, refresh loop and
/// metrics server.
pub struct Agent {
    cfg: Config,
    metrics: Arc<ExporterMetrics>,
    server: MetricsServer,
    refresh_task: Option<tokio::task::JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    cancel: CancellationToken,
}

impl Agent {
    /// Creates a new Agent, initializing the metrics registry.
    pub fn new(cfg: Config) -> Result<Self> {
        let metrics = Arc::new(ExporterMetrics::new().context("creating metrics registry")?);
        let server = MetricsServer::new(&cfg.listen_addr);

        Ok(Self {
            cfg,
            metrics,
            server,
            refresh_task: None,
            local_addr: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Shared metrics registry.
    pub fn metrics(&self) -> &Arc<ExporterMetrics> {
        &self.metrics
    }

    /// Address the metrics server is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Validate credentials, then start serving and refreshing.
    ///
    /// Nothing is served when validation fails.
    pub async fn start(&mut self) -> Result<()> {
        // 1. Create the Jellyfin client.
        let client = self.create_client()?;

        // 2. Validate the token before anything is exposed.
        let server_info = validate_credentials(&client).await?;
        info!(
            server_name = %server_info.server_name,
            version = %server_info.version,
            host = %self.cfg.jellyfin.host,
            "connected to jellyfin",
        );

        // 3. Start the metrics server.
        let addr = self
            .server
            .start(Arc::clone(&self.metrics))
            .await
            .context("starting metrics server")?;
        self.local_addr = Some(addr);

        // 4. Start the refresh loop.
        let refresher = Refresher::new(
            Arc::new(client),
            Arc::clone(&self.metrics),
            Arc::new(SystemClock),
            self.cfg.staleness.thresholds(),
            self.cfg.refresh_interval,
        );
        self.refresh_task = Some(refresher.spawn(self.cancel.child_token()));

        info!("agent fully started");

        Ok(())
    }

    /// Gracefully stop all components.
    pub async fn stop(&mut self) -> Result<()> {
        // Signal the refresh loop to stop; an in-flight cycle is abandoned.
        self.cancel.cancel();

        if let Some(task) = self.refresh_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "refresh task ended abnormally");
            }
        }

        self.server.stop().await?;

        Ok(())
    }

    /// Create a Jellyfin client with a request metrics callback.
    fn create_client(&self) -> Result<jellyfin::Client> {
        let client =
            jellyfin::Client::new(&self.cfg.jellyfin).context("creating jellyfin client")?;

        let metrics = Arc::clone(&self.metrics);
        let client = client.with_metrics(Box::new(move |endpoint, status, duration| {
            metrics.observe_request(endpoint, status, duration);
        }));

        Ok(client)
    }
}

/// One-time startup check that the configured token is accepted.
///
/// A rejected token and any other failure produce different messages;
/// the underlying [`FetchError`] stays in the error chain.
pub async fn validate_credentials<S: MediaServer>(server: &S) -> Result<ServerInfo> {
    match server.fetch_server_info().await {
        Ok(info) => Ok(info),
        Err(e @ FetchError::InvalidToken) => {
            Err(anyhow::Error::new(e).context("provided jellyfin api token is invalid"))
        }
        Err(e) => Err(anyhow::Error::new(e).context("validating jellyfin api token")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jellyfin::{LibraryCounts, SessionRecord};

    struct InfoOnly(fn() -> Result<ServerInfo, FetchError>);

    impl MediaServer for InfoOnly {
        async fn fetch_sessions(&self) -> Result<Vec<SessionRecord>, FetchError> {
            Ok(Vec::new())
        }

        async fn fetch_library_counts(&self) -> Result<LibraryCounts, FetchError> {
            Ok(LibraryCounts::default())
        }

        async fn fetch_server_info(&self) -> Result<ServerInfo, FetchError> {
            (self.0)()
        }
    }

    #[tokio::test]
    async fn test_validate_credentials_ok() {
        let server = InfoOnly(|| {
            Ok(ServerInfo {
                server_name: "media".to_string(),
                version: "10.9.7".to_string(),
                id: "abc".to_string(),
            })
        });

        let info = validate_credentials(&server).await.expect("valid");
        assert_eq!(info.server_name, "media");
    }

    #[tokio::test]
    async fn test_validate_credentials_invalid_token() {
        let server = InfoOnly(|| Err(FetchError::InvalidToken));
        let err = validate_credentials(&server).await.expect_err("invalid");

        assert!(err.to_string().contains("token is invalid"));
        assert!(err
            .downcast_ref::<FetchError>()
            .is_some_and(FetchError::is_invalid_token));
    }

    #[tokio::test]
    async fn test_validate_credentials_other_failure() {
        let server = InfoOnly(|| {
            Err(FetchError::UnknownApi {
                status: 500,
                path: "/System/Info".to_string(),
            })
        });
        let err = validate_credentials(&server).await.expect_err("failure");

        assert_eq!(err.to_string(), "validating jellyfin api token");
        assert!(err
            .downcast_ref::<FetchError>()
            .is_some_and(|e| !e.is_invalid_token()));
    }

    #[test]
    fn test_new_agent_has_no_address() {
        let agent = Agent::new(Config::default()).expect("agent");
        assert!(agent.local_addr().is_none());
        assert!(agent.metrics().encode().is_ok());
    }
}
