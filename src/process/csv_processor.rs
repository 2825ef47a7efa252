use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, warn};

use crate::process::{
    date_parser::parse_yyyymmdd,
    utils::{clean_str, header_key, split_nomprenom},
};
use crate::record::DecesRecord;

/// Columns we know how to read, with every header spelling that maps onto them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Nom,
    Prenoms,
    NomPrenom,
    Sexe,
    DateNaissance,
    CodeLieuNaissance,
    LieuNaissance,
    DateDeces,
    CodeLieuDeces,
    NumeroActe,
}

impl Column {
    const ALL: [Column; 10] = [
        Column::Nom,
        Column::Prenoms,
        Column::NomPrenom,
        Column::Sexe,
        Column::DateNaissance,
        Column::CodeLieuNaissance,
        Column::LieuNaissance,
        Column::DateDeces,
        Column::CodeLieuDeces,
        Column::NumeroActe,
    ];

    /// Lowercase header names: labelled layout first, raw INSEE layout second.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Column::Nom => &["nom"],
            Column::Prenoms => &["prénoms", "prenoms"],
            Column::NomPrenom => &["nomprenom"],
            Column::Sexe => &["sexe"],
            Column::DateNaissance => &["date naissance", "datenaiss"],
            Column::CodeLieuNaissance => &["code lieu naissance", "lieunaiss"],
            Column::LieuNaissance => &["lieu naissance", "commnaiss"],
            Column::DateDeces => &["date décès", "date deces", "datedeces"],
            Column::CodeLieuDeces => &["code lieu décès", "code lieu deces", "lieudeces"],
            Column::NumeroActe => &["numéro acte", "numero acte", "actedeces"],
        }
    }
}

/// Index of each known column in a file's header row.
#[derive(Debug, Default)]
struct ColumnMap {
    idx: [Option<usize>; 10],
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Self {
        let mut map = ColumnMap::default();
        for (i, raw) in headers.iter().enumerate() {
            let key = header_key(raw);
            if let Some(pos) = Column::ALL
                .iter()
                .position(|c| c.aliases().contains(&key.as_str()))
            {
                // first occurrence wins
                map.idx[pos].get_or_insert(i);
            }
        }
        map
    }

    fn index(&self, col: Column) -> Option<usize> {
        self.idx[col as usize]
    }

    fn text(&self, row: &StringRecord, col: Column) -> String {
        self.index(col)
            .and_then(|i| row.get(i))
            .map(clean_str)
            .unwrap_or_default()
    }

    fn is_empty(&self) -> bool {
        self.idx.iter().all(Option::is_none)
    }

    fn to_record(&self, row: &StringRecord) -> DecesRecord {
        let (mut nom, mut prenoms) = (self.text(row, Column::Nom), self.text(row, Column::Prenoms));
        if self.index(Column::Nom).is_none() && self.index(Column::Prenoms).is_none() {
            (nom, prenoms) = split_nomprenom(&self.text(row, Column::NomPrenom));
        }

        DecesRecord {
            nom,
            prenoms,
            sexe: self.text(row, Column::Sexe),
            date_naissance: parse_yyyymmdd(&self.text(row, Column::DateNaissance)),
            code_lieu_naissance: self.text(row, Column::CodeLieuNaissance),
            lieu_naissance: self.text(row, Column::LieuNaissance),
            date_deces: parse_yyyymmdd(&self.text(row, Column::DateDeces)),
            code_lieu_deces: self.text(row, Column::CodeLieuDeces),
            numero_acte: self.text(row, Column::NumeroActe),
        }
    }
}

/// Records read from one CSV, plus the count of rows left out of `records`.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub records: Vec<DecesRecord>,
    pub skipped: u64,
}

/// An unbalanced quote makes the reader run on across line breaks, leaving
/// newlines or a lone `"` inside a field. No registry value contains either.
fn is_malformed(row: &StringRecord) -> bool {
    row.iter().any(|f| f.contains(&['\n', '\r', '"'][..]))
}

/// Parse a `;`-delimited death-registry CSV with a header row.
pub fn parse_deces_csv(text: &str) -> Result<ParsedFile> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr.headers().context("reading CSV header row")?.clone();
    let columns = ColumnMap::from_headers(&headers);
    if columns.is_empty() {
        warn!(headers = ?headers, "no known columns in header row");
    }

    let mut parsed = ParsedFile::default();
    for (idx, result) in rdr.records().enumerate() {
        match result {
            Ok(row) if is_malformed(&row) => {
                let line = row.position().map(|p| p.line());
                warn!(record = idx, line, "skipping malformed CSV row (stray quote)");
                parsed.skipped += 1;
            }
            Ok(row) if row.iter().all(|f| f.trim().is_empty()) => {
                debug!(record = idx, "skipping blank CSV row");
                parsed.skipped += 1;
            }
            Ok(row) => parsed.records.push(columns.to_record(&row)),
            Err(e) => {
                warn!(record = idx, error = %e, "skipping unreadable CSV row");
                parsed.skipped += 1;
            }
        }
    }
    debug!(
        rows = parsed.records.len(),
        skipped = parsed.skipped,
        "parsed CSV"
    );
    Ok(parsed)
}
