/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Header comparison key: trimmed, quotes and BOM stripped, lowercased.
pub fn header_key(raw: &str) -> String {
    clean_str(raw.trim_start_matches('\u{feff}')).to_lowercase()
}

/// Decode CSV bytes: UTF-8 when valid, otherwise Latin-1.
pub fn decode_text(buf: Vec<u8>) -> String {
    match String::from_utf8(buf) {
        Ok(s) => s,
        // every Latin-1 byte is the code point of the same value
        Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
    }
}

/// Split the raw `nomprenom` column, `NOM*PRENOMS/`, into surname and given names.
pub fn split_nomprenom(raw: &str) -> (String, String) {
    let raw = clean_str(raw);
    let (nom, prenoms) = match raw.split_once('*') {
        Some((n, p)) => (n, p),
        None => (raw.as_str(), ""),
    };
    (
        nom.trim().to_string(),
        prenoms.trim_end_matches('/').trim().to_string(),
    )
}
