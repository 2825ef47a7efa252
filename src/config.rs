// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use chrono::{Datelike, Utc};
use chrono_tz::Tz;
use std::{ops::RangeInclusive, str::FromStr, time::Duration};
use url::Url;

use crate::record::DEFAULT_TABLE;

pub const DEFAULT_INSEE_BASE_URL: &str = "https://www.insee.fr/fr/statistiques/fichier/4190491";
pub const DEFAULT_LISTING_URL: &str = "https://www.insee.fr/fr/information/4190491";
pub const DEFAULT_FIRST_YEAR: i32 = 1975;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;
/// Seconds-first cron: every day at 00:00:00.
pub const DEFAULT_CRON: &str = "0 0 0 * * *";
pub const DEFAULT_TIMEZONE: &str = "Europe/Paris";

/// Everything a sync run needs, read from the environment.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub supabase_url: Url,
    pub supabase_key: String,
    pub table: String,
    pub insee_base_url: Url,
    pub listing_url: Url,
    pub first_year: i32,
    pub last_year: i32,
    pub batch_size: usize,
    pub http_timeout: Duration,
    /// Comma-separated conflict columns; enables upsert when set.
    pub on_conflict: Option<String>,
    pub cron: String,
    pub timezone: Tz,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| anyhow!("missing required env var {key}"));

        let supabase_url = parse_url("SUPABASE_URL", &require("SUPABASE_URL")?)?;
        let supabase_key = require("SUPABASE_KEY")?;

        let timezone_raw = get("SYNC_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = Tz::from_str(&timezone_raw)
            .map_err(|e| anyhow!("invalid SYNC_TIMEZONE {timezone_raw:?}: {e}"))?;

        let insee_base_url = parse_url(
            "INSEE_BASE_URL",
            &get("INSEE_BASE_URL").unwrap_or_else(|| DEFAULT_INSEE_BASE_URL.to_string()),
        )?;
        let listing_url = parse_url(
            "INSEE_LISTING_URL",
            &get("INSEE_LISTING_URL").unwrap_or_else(|| DEFAULT_LISTING_URL.to_string()),
        )?;

        let first_year = parse_or("INSEE_FIRST_YEAR", get("INSEE_FIRST_YEAR"), DEFAULT_FIRST_YEAR)?;
        let current_year = Utc::now().with_timezone(&timezone).year();
        let last_year = parse_or("INSEE_LAST_YEAR", get("INSEE_LAST_YEAR"), current_year)?;
        let batch_size = parse_or("SYNC_BATCH_SIZE", get("SYNC_BATCH_SIZE"), DEFAULT_BATCH_SIZE)?;
        let timeout_secs = parse_or(
            "SYNC_HTTP_TIMEOUT_SECS",
            get("SYNC_HTTP_TIMEOUT_SECS"),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?;

        let cfg = Self {
            supabase_url,
            supabase_key,
            table: get("SYNC_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            insee_base_url,
            listing_url,
            first_year,
            last_year,
            batch_size,
            http_timeout: Duration::from_secs(timeout_secs),
            on_conflict: get("SYNC_ON_CONFLICT"),
            cron: get("SYNC_CRON").unwrap_or_else(|| DEFAULT_CRON.to_string()),
            timezone,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `--from` / `--to` overrides from the command line.
    pub fn with_years(mut self, from: Option<i32>, to: Option<i32>) -> Result<Self> {
        if let Some(y) = from {
            self.first_year = y;
        }
        if let Some(y) = to {
            self.last_year = y;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.first_year..=self.last_year
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("SYNC_BATCH_SIZE must be greater than zero");
        }
        if self.first_year > self.last_year {
            bail!(
                "first year {} is after last year {}",
                self.first_year,
                self.last_year
            );
        }
        if self.http_timeout.is_zero() {
            bail!("SYNC_HTTP_TIMEOUT_SECS must be greater than zero");
        }
        Ok(())
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("invalid {key} {raw:?}"))
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v
            .parse()
            .with_context(|| format!("invalid {key} {v:?}")),
        None => Ok(default),
    }
}
