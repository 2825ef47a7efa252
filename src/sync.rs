// src/sync.rs
use anyhow::{Context, Result};
use std::ops::{AddAssign, RangeInclusive};
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::fetch::{
    urls::{discover_source_files, monthly_files, plan_from_listing},
    zips::build_client,
    ArchiveSource, HttpArchiveSource, SourceFile,
};
use crate::process;
use crate::store::{batch_insert, RecordSink, SupabaseSink};

/// What happened to one archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Missing,
    Synced {
        parsed: u64,
        skipped: u64,
        written: u64,
        failed_batches: usize,
    },
}

/// Totals for a run, logged at the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub files_synced: usize,
    pub files_missing: usize,
    pub files_failed: usize,
    pub records_parsed: u64,
    pub rows_skipped: u64,
    pub rows_written: u64,
    pub failed_batches: usize,
}

impl SyncReport {
    fn record(&mut self, outcome: &Result<FileOutcome>) {
        match outcome {
            Ok(FileOutcome::Missing) => self.files_missing += 1,
            Ok(FileOutcome::Synced {
                parsed,
                skipped,
                written,
                failed_batches,
            }) => {
                self.files_synced += 1;
                self.records_parsed += parsed;
                self.rows_skipped += skipped;
                self.rows_written += written;
                self.failed_batches += failed_batches;
            }
            Err(_) => self.files_failed += 1,
        }
    }

    /// True when every file that exists was fully written.
    pub fn is_clean(&self) -> bool {
        self.files_failed == 0 && self.failed_batches == 0
    }
}

impl AddAssign for SyncReport {
    fn add_assign(&mut self, rhs: Self) {
        self.files_synced += rhs.files_synced;
        self.files_missing += rhs.files_missing;
        self.files_failed += rhs.files_failed;
        self.records_parsed += rhs.records_parsed;
        self.rows_skipped += rhs.rows_skipped;
        self.rows_written += rhs.rows_written;
        self.failed_batches += rhs.failed_batches;
    }
}

/// Moves archives from a source into a sink.
#[derive(Debug)]
pub struct Synchronizer<S, K> {
    source: S,
    sink: K,
    batch_size: usize,
}

impl<S: ArchiveSource, K: RecordSink> Synchronizer<S, K> {
    pub fn new(source: S, sink: K, batch_size: usize) -> Self {
        Self {
            source,
            sink,
            batch_size,
        }
    }

    /// Download, parse and write one archive.
    #[instrument(level = "info", skip(self, file), fields(file = %file))]
    pub async fn sync_file(&self, file: &SourceFile) -> Result<FileOutcome> {
        let start = Instant::now();
        let Some(bytes) = self.source.fetch_archive(&file.url).await? else {
            return Ok(FileOutcome::Missing);
        };

        let parsed = tokio::task::spawn_blocking(move || process::parse_archive(&bytes))
            .await
            .context("parse task panicked")?
            .with_context(|| format!("parsing {}", file))?;
        info!(
            records = parsed.records.len(),
            skipped = parsed.skipped,
            "records found"
        );

        let summary = batch_insert(&self.sink, &parsed.records, self.batch_size).await;
        info!(
            written = summary.rows_written,
            failed_batches = summary.failed_batches,
            elapsed = ?start.elapsed(),
            "file done"
        );

        Ok(FileOutcome::Synced {
            parsed: parsed.records.len() as u64,
            skipped: parsed.skipped,
            written: summary.rows_written,
            failed_batches: summary.failed_batches,
        })
    }

    /// Annual archive first; monthly archives when it is absent or fails.
    pub async fn sync_year(&self, base: &Url, year: i32) -> SyncReport {
        info!("=== year {} ===", year);
        let mut report = SyncReport::default();

        let annual = SourceFile::annual(base, year);
        let outcome = self.sync_file(&annual).await;
        log_failure(&annual, &outcome);
        report.record(&outcome);
        if matches!(outcome, Ok(FileOutcome::Synced { .. })) {
            return report;
        }

        warn!(year, "annual archive unavailable, trying monthly archives");
        for file in monthly_files(base, year) {
            let outcome = self.sync_file(&file).await;
            log_failure(&file, &outcome);
            report.record(&outcome);
        }
        report
    }

    /// Walk `years` in ascending order.
    pub async fn sync_years(&self, base: &Url, years: RangeInclusive<i32>) -> SyncReport {
        let mut report = SyncReport::default();
        for year in years {
            report += self.sync_year(base, year).await;
        }
        report
    }

    /// Sync an explicit list of archives, e.g. a discovered listing.
    pub async fn sync_files(&self, files: &[SourceFile]) -> SyncReport {
        let mut report = SyncReport::default();
        for file in files {
            let outcome = self.sync_file(file).await;
            if matches!(outcome, Ok(FileOutcome::Missing)) {
                warn!(file = %file, "listed archive not found");
            }
            log_failure(file, &outcome);
            report.record(&outcome);
        }
        report
    }
}

/// One full run against the real INSEE and Supabase endpoints.
///
/// With `discover`, the archive list comes from the INSEE listing page
/// instead of probing annual then monthly URLs.
pub async fn run_configured(cfg: &SyncConfig, discover: bool) -> Result<SyncReport> {
    let start = Instant::now();
    info!(
        first_year = cfg.first_year,
        last_year = cfg.last_year,
        table = %cfg.table,
        discover,
        "starting INSEE sync"
    );

    let client = build_client(cfg.http_timeout)?;
    let sink = SupabaseSink::new(
        client.clone(),
        &cfg.supabase_url,
        cfg.supabase_key.clone(),
        &cfg.table,
        cfg.on_conflict.clone(),
    )?;
    info!(endpoint = %sink.endpoint(), "writing to");
    let source = HttpArchiveSource::new(client.clone());
    let sync = Synchronizer::new(source, sink, cfg.batch_size);

    let report = if discover {
        let listed = discover_source_files(&client, &cfg.listing_url).await?;
        let files = plan_from_listing(&listed, cfg.years());
        info!(files = files.len(), "archives planned from listing");
        sync.sync_files(&files).await
    } else {
        sync.sync_years(&cfg.insee_base_url, cfg.years()).await
    };

    info!(?report, elapsed = ?start.elapsed(), "sync finished");
    if !report.is_clean() {
        warn!(
            files_failed = report.files_failed,
            failed_batches = report.failed_batches,
            "sync finished with errors"
        );
    }
    Ok(report)
}

/// An archive a run requests, and the archives it tries if that one is
/// missing or fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub file: SourceFile,
    pub fallbacks: Vec<SourceFile>,
}

/// The archives a run would fetch. Listed files have no fallbacks; without
/// a listing each annual archive carries its 12 monthly archives.
pub async fn planned_files(cfg: &SyncConfig, discover: bool) -> Result<Vec<PlannedFile>> {
    if discover {
        let client = build_client(cfg.http_timeout)?;
        let listed = discover_source_files(&client, &cfg.listing_url).await?;
        Ok(plan_from_listing(&listed, cfg.years())
            .into_iter()
            .map(|file| PlannedFile {
                file,
                fallbacks: Vec::new(),
            })
            .collect())
    } else {
        Ok(cfg
            .years()
            .map(|y| PlannedFile {
                file: SourceFile::annual(&cfg.insee_base_url, y),
                fallbacks: monthly_files(&cfg.insee_base_url, y),
            })
            .collect())
    }
}

fn log_failure(file: &SourceFile, outcome: &Result<FileOutcome>) {
    if let Err(e) = outcome {
        error!(url = %file.url, "{:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::test_support::zip_bytes;
    use crate::store::test_support::MemorySink;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const HEADER: &str = "nomprenom;sexe;datenaiss;lieunaiss;commnaiss;paysnaiss;datedeces;lieudeces;actedeces\n";

    fn base() -> Url {
        Url::parse("https://insee.test/fichier").unwrap()
    }

    fn archive(rows: usize) -> Vec<u8> {
        let mut csv = HEADER.to_string();
        for i in 0..rows {
            csv.push_str(&format!(
                "NOM{i}*PRENOM/;1;19400101;75056;PARIS;;20240101;75056;{i}\n"
            ));
        }
        zip_bytes(&[("deces.csv", csv.as_bytes())])
    }

    /// Serves archives from a map; every other URL is a 404. Records the URLs asked for.
    #[derive(Default)]
    struct MapSource {
        files: HashMap<String, Vec<u8>>,
        broken: Vec<String>,
        requested: Mutex<Vec<String>>,
    }

    impl MapSource {
        fn with(mut self, file: &SourceFile, bytes: Vec<u8>) -> Self {
            self.files.insert(file.url.clone(), bytes);
            self
        }

        fn broken(mut self, file: &SourceFile) -> Self {
            self.broken.push(file.url.clone());
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ArchiveSource for MapSource {
        async fn fetch_archive(&self, url: &str) -> Result<Option<Vec<u8>>> {
            self.requested.lock().unwrap().push(url.to_string());
            if self.broken.iter().any(|u| u == url) {
                return Err(anyhow!("HTTP error: 500 Internal Server Error"));
            }
            Ok(self.files.get(url).cloned())
        }
    }

    #[tokio::test]
    async fn annual_archive_skips_monthly_requests() {
        let annual = SourceFile::annual(&base(), 2020);
        let source = MapSource::default().with(&annual, archive(5));
        let sync = Synchronizer::new(source, MemorySink::default(), 2);

        let report = sync.sync_year(&base(), 2020).await;

        assert_eq!(sync.source.requested(), vec![annual.url.clone()]);
        assert_eq!(
            report,
            SyncReport {
                files_synced: 1,
                records_parsed: 5,
                rows_written: 5,
                ..Default::default()
            }
        );
        assert_eq!(sync.sink.batches.lock().unwrap().len(), 3);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn missing_annual_falls_back_to_monthly() {
        let b = base();
        let source = MapSource::default()
            .with(&SourceFile::monthly(&b, 2025, 1), archive(3))
            .with(&SourceFile::monthly(&b, 2025, 2), archive(4));
        let sync = Synchronizer::new(source, MemorySink::default(), 1000);

        let report = sync.sync_year(&b, 2025).await;

        let requested = sync.source.requested();
        assert_eq!(requested.len(), 13);
        assert!(requested[0].ends_with("Deces_2025.zip"));
        assert!(requested[1].ends_with("Deces_2025_M01.zip"));
        assert!(requested[12].ends_with("Deces_2025_M12.zip"));

        assert_eq!(report.files_synced, 2);
        assert_eq!(report.files_missing, 11);
        assert_eq!(report.rows_written, 7);
        let acts: Vec<_> = sync
            .sink
            .rows()
            .into_iter()
            .map(|r| r.numero_acte)
            .collect();
        assert_eq!(acts, vec!["0", "1", "2", "0", "1", "2", "3"]);
    }

    #[tokio::test]
    async fn failing_annual_also_falls_back() {
        let b = base();
        let source = MapSource::default()
            .broken(&SourceFile::annual(&b, 2019))
            .with(&SourceFile::monthly(&b, 2019, 6), archive(1));
        let sync = Synchronizer::new(source, MemorySink::default(), 1000);

        let report = sync.sync_year(&b, 2019).await;

        assert_eq!(report.files_failed, 1);
        assert_eq!(report.files_synced, 1);
        assert_eq!(report.rows_written, 1);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn corrupt_archive_is_counted_not_fatal() {
        let b = base();
        let source = MapSource::default()
            .with(&SourceFile::annual(&b, 2001), b"garbage".to_vec())
            .with(&SourceFile::annual(&b, 2002), archive(2));
        let sync = Synchronizer::new(source, MemorySink::default(), 1000);

        let report = sync.sync_years(&b, 2001..=2002).await;

        assert_eq!(report.files_failed, 1);
        assert_eq!(report.files_missing, 12);
        assert_eq!(report.files_synced, 1);
        assert_eq!(report.rows_written, 2);
    }

    #[tokio::test]
    async fn failed_batches_show_in_report() {
        let annual = SourceFile::annual(&base(), 2010);
        let source = MapSource::default().with(&annual, archive(4));
        let sync = Synchronizer::new(source, MemorySink::failing_on(vec![0]), 2);

        let outcome = sync.sync_file(&annual).await.unwrap();

        assert_eq!(
            outcome,
            FileOutcome::Synced {
                parsed: 4,
                skipped: 0,
                written: 2,
                failed_batches: 1
            }
        );
    }

    #[tokio::test]
    async fn listed_files_are_synced_in_order() {
        let b = base();
        let files = vec![
            SourceFile::annual(&b, 2023),
            SourceFile::monthly(&b, 2024, 1),
            SourceFile::monthly(&b, 2024, 2),
        ];
        let source = MapSource::default()
            .with(&files[0], archive(1))
            .with(&files[1], archive(2));
        let sync = Synchronizer::new(source, MemorySink::default(), 1000);

        let report = sync.sync_files(&files).await;

        let expected: Vec<_> = files.iter().map(|f| f.url.clone()).collect();
        assert_eq!(sync.source.requested(), expected);
        assert_eq!(report.files_synced, 2);
        assert_eq!(report.files_missing, 1);
        assert_eq!(report.rows_written, 3);
    }

    #[tokio::test]
    async fn annual_plan_lists_monthly_fallbacks() {
        let cfg = SyncConfig::from_lookup(|key| match key {
            "SUPABASE_URL" => Some("https://abc.supabase.co".into()),
            "SUPABASE_KEY" => Some("k".into()),
            _ => None,
        })
        .unwrap()
        .with_years(Some(2024), Some(2025))
        .unwrap();

        let plan = planned_files(&cfg, false).await.unwrap();

        assert_eq!(plan.len(), 2);
        assert!(plan[1].file.url.ends_with("Deces_2025.zip"));
        assert_eq!(plan[1].fallbacks.len(), 12);
        assert!(plan[1].fallbacks[0].url.ends_with("Deces_2025_M01.zip"));
        assert!(plan[1].fallbacks[11].url.ends_with("Deces_2025_M12.zip"));
    }
}
