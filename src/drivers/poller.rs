//! Real network poller

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use super::DriverHandle;
use crate::error::{MonitorError, Result};

/// Shortest period a poller may run at
pub const MIN_POLL_PERIOD_MS: u64 = 50;

/// Issues real GET requests against a local endpoint, discarding the bodies.
///
/// The poller does not record anything itself: the serving side counts the
/// responses through `record_request`, so the measured cost is the real one.
#[derive(Debug, Clone)]
pub struct HttpPoller {
    pub url: Url,
    pub period: Duration,
    pub clients: usize,
}

impl HttpPoller {
    pub fn new(url: &str, period: Duration, clients: usize) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| MonitorError::Config(format!("poll url {:?}: {}", url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MonitorError::Config(format!("poll url must be http(s), got {}", url.scheme())));
        }
        Ok(Self {
            url,
            period: period.max(Duration::from_millis(MIN_POLL_PERIOD_MS)),
            clients: clients.max(1),
        })
    }

    /// Per-request timeout: one period minus a little slack, at least 1 s.
    pub fn request_timeout(&self) -> Duration {
        let ms = (self.period.as_millis() as u64).saturating_sub(10).max(1000);
        Duration::from_millis(ms)
    }

    /// Start the pollers; the first request goes out immediately.
    pub fn start(self) -> Result<DriverHandle> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout())
            .build()
            .map_err(|e| MonitorError::Http(e.to_string()))?;
        let url = Arc::new(self.url.clone());

        let mut handle = DriverHandle::new("http-poller");
        for _ in 0..self.clients {
            let client = client.clone();
            let url = url.clone();
            handle.spawn_periodic(self.period, true, move || {
                let client = client.clone();
                let url = url.clone();
                async move {
                    if let Err(e) = poll_once(&client, &url).await {
                        trace!(error = %e, "poll failed");
                    }
                }
            });
        }
        debug!(
            url = %self.url,
            period_ms = self.period.as_millis() as u64,
            clients = self.clients,
            "http poller started"
        );
        Ok(handle)
    }
}

async fn poll_once(client: &reqwest::Client, url: &Url) -> Result<usize> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| MonitorError::Http(e.to_string()))?;
    let body = response.bytes().await.map_err(|e| MonitorError::Http(e.to_string()))?;
    Ok(body.len())
}
