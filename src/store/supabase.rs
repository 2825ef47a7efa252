use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Request};
use tracing::{debug, instrument};
use url::Url;

use super::RecordSink;
use crate::record::DecesRecord;

/// Writes records through the Supabase (PostgREST) REST API.
#[derive(Clone)]
pub struct SupabaseSink {
    client: Client,
    endpoint: Url,
    api_key: String,
    on_conflict: Option<String>,
}

impl std::fmt::Debug for SupabaseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseSink")
            .field("endpoint", &self.endpoint.as_str())
            .field("on_conflict", &self.on_conflict)
            .finish_non_exhaustive()
    }
}

impl SupabaseSink {
    /// `base_url` is the project URL, e.g. `https://xyz.supabase.co`.
    pub fn new(
        client: Client,
        base_url: &Url,
        api_key: impl Into<String>,
        table: &str,
        on_conflict: Option<String>,
    ) -> Result<Self> {
        let endpoint = Url::parse(&format!(
            "{}/rest/v1/{}",
            base_url.as_str().trim_end_matches('/'),
            table
        ))
        .with_context(|| format!("building REST endpoint for table {}", table))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            on_conflict,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Plain insert, or upsert on the configured conflict columns.
    fn prefer(&self) -> &'static str {
        if self.on_conflict.is_some() {
            "return=minimal,resolution=merge-duplicates"
        } else {
            "return=minimal"
        }
    }

    fn build_request(&self, batch: &[DecesRecord]) -> Result<Request> {
        let mut req = self
            .client
            .post(self.endpoint.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", self.prefer())
            .json(batch);
        if let Some(cols) = &self.on_conflict {
            req = req.query(&[("on_conflict", cols)]);
        }
        req.build().context("building insert request")
    }
}

#[async_trait]
impl RecordSink for SupabaseSink {
    #[instrument(level = "debug", skip(self, batch), fields(rows = batch.len()))]
    async fn insert_batch(&self, batch: &[DecesRecord]) -> Result<()> {
        let req = self.build_request(batch)?;
        let resp = self
            .client
            .execute(req)
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP error: {}: {}", status, body.trim()));
        }
        debug!(%status, "batch accepted");
        Ok(())
    }
}
