use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Destination table for death records.
pub const DEFAULT_TABLE: &str = "insee_deces";

/// One row of the `insee_deces` table.
///
/// Text columns are stored trimmed and may be empty; dates serialize as
/// `YYYY-MM-DD` or `null` when the source value was missing or invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecesRecord {
    pub nom: String,
    pub prenoms: String,
    pub sexe: String,
    pub date_naissance: Option<NaiveDate>,
    pub code_lieu_naissance: String,
    pub lieu_naissance: String,
    pub date_deces: Option<NaiveDate>,
    pub code_lieu_deces: String,
    pub numero_acte: String,
}
