// src/fetch/urls.rs
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::RangeInclusive;
use tracing::{debug, info};
use url::Url;

/// `Deces_2023.zip` or `Deces_2024_M07.zip`
static FILE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Deces_(\d{4})(?:_M(\d{2}))?\.zip$").expect("valid file name regex"));

/// One published INSEE archive: either a whole year or a single month.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceFile {
    pub year: i32,
    pub month: Option<u32>,
    pub url: String,
}

impl SourceFile {
    pub fn annual(base: &Url, year: i32) -> Self {
        Self {
            year,
            month: None,
            url: join_file(base, &format!("Deces_{year}.zip")),
        }
    }

    pub fn monthly(base: &Url, year: i32, month: u32) -> Self {
        Self {
            year,
            month: Some(month),
            url: join_file(base, &format!("Deces_{year}_M{month:02}.zip")),
        }
    }

    /// Recognise an archive URL by its file name. Anything else is `None`.
    pub fn parse(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        let name = parsed.path_segments()?.last()?;
        let caps = FILE_NAME_RE.captures(name)?;
        let year: i32 = caps[1].parse().ok()?;
        let month = match caps.get(2) {
            Some(m) => {
                let m: u32 = m.as_str().parse().ok()?;
                if !(1..=12).contains(&m) {
                    return None;
                }
                Some(m)
            }
            None => None,
        };
        Some(Self {
            year,
            month,
            url: parsed.to_string(),
        })
    }

    pub fn file_name(&self) -> String {
        match self.month {
            Some(m) => format!("Deces_{}_M{:02}.zip", self.year, m),
            None => format!("Deces_{}.zip", self.year),
        }
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// The twelve monthly candidates for `year`, January first.
pub fn monthly_files(base: &Url, year: i32) -> Vec<SourceFile> {
    (1..=12).map(|m| SourceFile::monthly(base, year, m)).collect()
}

/// Scrape the INSEE dataset page for archive links.
pub async fn discover_source_files(client: &Client, listing_url: &Url) -> Result<Vec<SourceFile>> {
    let html = client
        .get(listing_url.clone())
        .send()
        .await
        .with_context(|| format!("GET {}", listing_url))?
        .error_for_status()?
        .text()
        .await
        .with_context(|| format!("reading body from {}", listing_url))?;

    let files = extract_source_files(&html, listing_url);
    info!(url = %listing_url, count = files.len(), "discovered archives");
    Ok(files)
}

/// Pull every recognisable archive link out of a listing page.
pub fn extract_source_files(html: &str, base: &Url) -> Vec<SourceFile> {
    let selector = Selector::parse(r#"a[href$=".zip"]"#).expect("selector should parse");
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .filter_map(|e| e.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter_map(|u| {
            let file = SourceFile::parse(u.as_str());
            if file.is_none() {
                debug!(href = %u, "ignoring unrecognised archive link");
            }
            file
        })
        .collect()
}

/// For each year in `years`: the annual archive when listed, otherwise the
/// listed monthly archives in month order.
pub fn plan_from_listing(files: &[SourceFile], years: RangeInclusive<i32>) -> Vec<SourceFile> {
    let mut by_year: BTreeMap<i32, (Option<SourceFile>, BTreeSet<SourceFile>)> = BTreeMap::new();
    for f in files.iter().filter(|f| years.contains(&f.year)) {
        let entry = by_year.entry(f.year).or_default();
        match f.month {
            None => {
                entry.0.get_or_insert_with(|| f.clone());
            }
            Some(_) => {
                entry.1.insert(f.clone());
            }
        }
    }

    let mut plan = Vec::new();
    for (_, (annual, monthly)) in by_year {
        match annual {
            Some(a) => plan.push(a),
            None => {
                let mut seen = BTreeSet::new();
                plan.extend(monthly.into_iter().filter(|m| seen.insert(m.month)));
            }
        }
    }
    plan
}

fn join_file(base: &Url, name: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), name)
}
