// src/fetch/mod.rs
use anyhow::Result;
use async_trait::async_trait;

pub mod urls;
pub mod zips;

pub use urls::SourceFile;
pub use zips::HttpArchiveSource;

/// Somewhere archives can be downloaded from.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// `Ok(None)` when the archive is not published.
    async fn fetch_archive(&self, url: &str) -> Result<Option<Vec<u8>>>;
}
