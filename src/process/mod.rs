// src/process/mod.rs
use anyhow::{bail, Context, Result};
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

pub mod csv_processor;
pub mod date_parser;
pub mod utils;

pub use csv_processor::{parse_deces_csv, ParsedFile};
pub use date_parser::parse_yyyymmdd;

/// Open an in-memory ZIP and return the decoded text of its CSV.
///
/// The first `.csv` entry is used; archives without one fall back to the
/// first file entry.
pub fn extract_csv(bytes: &[u8]) -> Result<String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).context("Failed to read ZIP archive")?;

    let mut first_file = None;
    let mut chosen = None;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to access ZIP entry #{}", i))?;
        if !entry.is_file() {
            continue;
        }
        first_file.get_or_insert(i);
        if entry.name().to_lowercase().ends_with(".csv") {
            chosen = Some(i);
            break;
        }
    }

    let Some(index) = chosen.or(first_file) else {
        bail!("ZIP archive contains no files");
    };

    let mut entry = archive.by_index(index)?;
    let name = entry.name().to_string();
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buf)
        .with_context(|| format!("Failed to read {} into memory", name))?;
    debug!(entry = %name, size = buf.len(), "extracted");

    Ok(utils::decode_text(buf))
}

/// Extract and parse one downloaded archive.
pub fn parse_archive(bytes: &[u8]) -> Result<ParsedFile> {
    let text = extract_csv(bytes)?;
    parse_deces_csv(&text)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::CompressionMethod;

    /// Build a ZIP in memory from `(name, contents)` pairs.
    pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            for (name, contents) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(contents).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::zip_bytes;
    use super::*;

    #[test]
    fn extracts_the_csv_entry() {
        let bytes = zip_bytes(&[
            ("LISEZMOI.txt", b"documentation"),
            ("deces-2024-m01.csv", b"nomprenom;sexe\nA*B/;1\n"),
        ]);
        assert_eq!(extract_csv(&bytes).unwrap(), "nomprenom;sexe\nA*B/;1\n");
    }

    #[test]
    fn falls_back_to_first_file_without_csv_extension() {
        let bytes = zip_bytes(&[("deces.txt", b"Nom;Sexe\n")]);
        assert_eq!(extract_csv(&bytes).unwrap(), "Nom;Sexe\n");
    }

    #[test]
    fn decodes_latin1_content() {
        let bytes = zip_bytes(&[("deces.csv", b"Nom;Pr\xe9noms\nL\xc9A;ZO\xc9\n")]);
        let parsed = parse_archive(&bytes).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].nom, "LÉA");
        assert_eq!(parsed.records[0].prenoms, "ZOÉ");
    }

    #[test]
    fn rejects_empty_and_corrupt_archives() {
        assert!(extract_csv(&zip_bytes(&[])).is_err());
        assert!(extract_csv(b"not a zip at all").is_err());
    }
}
