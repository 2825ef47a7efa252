use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::ArchiveSource;

const USER_AGENT: &str = concat!("insee-sync/", env!("CARGO_PKG_VERSION"));

/// Downloads archives over HTTP, keeping them in memory.
#[derive(Debug, Clone)]
pub struct HttpArchiveSource {
    client: Client,
}

impl HttpArchiveSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Shared HTTP client with the configured request timeout.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("building HTTP client")
}

/// 2xx is a download, 404 means "not published", anything else is an error.
fn classify(status: StatusCode) -> Result<bool> {
    if status.is_success() {
        Ok(true)
    } else if status == StatusCode::NOT_FOUND {
        Ok(false)
    } else {
        Err(anyhow!("HTTP error: {}", status))
    }
}

#[async_trait]
impl ArchiveSource for HttpArchiveSource {
    async fn fetch_archive(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        if !classify(resp.status()).with_context(|| format!("GET {}", url))? {
            debug!(url, "not published");
            return Ok(None);
        }

        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("reading body from {}", url))?;
        info!(url, size = bytes.len(), elapsed = ?start.elapsed(), "downloaded");
        Ok(Some(bytes.to_vec()))
    }
}
