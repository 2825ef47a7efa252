// src/store/mod.rs
use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use crate::record::DecesRecord;

pub mod supabase;

pub use supabase::SupabaseSink;

/// Destination for parsed records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn insert_batch(&self, batch: &[DecesRecord]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub batches: usize,
    pub failed_batches: usize,
    pub rows_written: u64,
}

/// Write `records` in order, `batch_size` rows per request.
///
/// A failed batch is logged and counted; later batches are still sent.
pub async fn batch_insert<K>(sink: &K, records: &[DecesRecord], batch_size: usize) -> InsertSummary
where
    K: RecordSink + ?Sized,
{
    let batch_size = batch_size.max(1);
    let total = records.chunks(batch_size).len();
    info!(rows = records.len(), batches = total, "inserting");

    let mut summary = InsertSummary::default();
    for (i, batch) in records.chunks(batch_size).enumerate() {
        summary.batches += 1;
        match sink.insert_batch(batch).await {
            Ok(()) => {
                summary.rows_written += batch.len() as u64;
                info!("batch {}/{} inserted", i + 1, total);
            }
            Err(e) => {
                summary.failed_batches += 1;
                error!("batch {}/{} failed: {:#}", i + 1, total, e);
            }
        }
    }
    summary
}


#[cfg(test)]
mod tests {
    use super::test_support::MemorySink;
    use super::*;

    fn records(n: usize) -> Vec<DecesRecord> {
        (0..n)
            .map(|i| DecesRecord {
                numero_acte: i.to_string(),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn splits_into_ordered_batches() {
        let sink = MemorySink::default();
        let recs = records(2500);
        let summary = batch_insert(&sink, &recs, 1000).await;

        assert_eq!(
            summary,
            InsertSummary {
                batches: 3,
                failed_batches: 0,
                rows_written: 2500
            }
        );
        let sizes: Vec<_> = sink.batches.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert_eq!(sink.rows(), recs);
    }

    #[tokio::test]
    async fn failed_batch_does_not_stop_the_rest() {
        let sink = MemorySink::failing_on(vec![1]);
        let recs = records(30);
        let summary = batch_insert(&sink, &recs, 10).await;

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.failed_batches, 1);
        assert_eq!(summary.rows_written, 20);
        let written = sink.rows();
        assert_eq!(written[..10], recs[..10]);
        assert_eq!(written[10..], recs[20..]);
    }

    #[tokio::test]
    async fn nothing_to_insert() {
        let sink = MemorySink::default();
        let summary = batch_insert(&sink, &[], 1000).await;
        assert_eq!(summary, InsertSummary::default());
        assert!(sink.batches.lock().unwrap().is_empty());
    }
}
