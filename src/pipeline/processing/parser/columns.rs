//! Header matching for tabular sources (CSV and Excel).
//!
//! Headers are compared after lowercasing, turning `_` into spaces, dropping
//! dots and collapsing whitespace, so `Ack. No.`, `ack_no` and `ACK NO` all
//! land on the same canonical field.

use tracing::debug;

use super::{ParseOutcome, RawRecord, RawValue};
use crate::constants::*;

/// Canonical field → accepted header spellings (already normalized).
const COLUMN_SYNONYMS: &[(&str, &[&str])] = &[
    (
        COL_ID,
        &[
            "complaint id",
            "complaint no",
            "complaint number",
            "acknowledgement number",
            "acknowledgment number",
            "acknowledgement no",
            "acknowledgment no",
            "acknowledgement",
            "acknowledgment",
            "ack no",
            "ack number",
            "reference no",
            "ref no",
            "id",
        ],
    ),
    (
        COL_COMPLAINT_DATE,
        &["complaint date", "date of complaint", "reported date", "reporting date", "date"],
    ),
    (COL_INCIDENT_DATE, &["incident date", "date of incident", "incident on"]),
    (
        COL_NAME,
        &["complainant name", "name of complainant", "victim name", "full name", "complainant", "name"],
    ),
    (
        COL_MOBILE,
        &["mobile", "mobile no", "mobile number", "phone", "phone number", "phone no", "contact", "contact number", "contact no"],
    ),
    (COL_EMAIL, &["email", "e-mail", "email id", "email address", "mail"]),
    (COL_DISTRICT, &["district", "location", "area"]),
    (COL_POLICE_STATION, &["police station", "station", "ps"]),
    (COL_CRIME_TYPE, &["crime type", "crime category", "category", "sub category", "type"]),
    (COL_PLATFORM, &["platform", "medium", "mode", "source"]),
    (
        COL_AMOUNT,
        &["amount", "amount lost", "loss amount", "fraud amount", "amount involved", "loss", "lost"],
    ),
    (COL_STATUS, &["status", "current status", "case status"]),
    (
        COL_DESCRIPTION,
        &["description", "details", "complaint details", "incident details", "remarks", "narrative"],
    ),
];

pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .replace('_', " ")
        .replace('.', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical field for a header, if any synonym matches.
pub fn canonical_field(header: &str) -> Option<&'static str> {
    let normalized = normalize_header(header);
    COLUMN_SYNONYMS
        .iter()
        .find(|(_, synonyms)| synonyms.contains(&normalized.as_str()))
        .map(|(field, _)| *field)
}

/// Column index → canonical field for one header row. When two columns map to
/// the same field the leftmost wins.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    columns: Vec<Option<&'static str>>,
}

impl ColumnMap {
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Self {
        let mut seen: Vec<&'static str> = Vec::new();
        let columns = headers
            .iter()
            .map(|h| {
                let field = canonical_field(h.as_ref())?;
                if seen.contains(&field) {
                    debug!("Ignoring repeated column '{}' for {}", h.as_ref(), field);
                    return None;
                }
                seen.push(field);
                Some(field)
            })
            .collect();
        Self { columns }
    }

    pub fn mapped_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().flatten().copied()
    }

    /// Build a record from one row of cells. `None` cells are blank.
    pub fn record_from_row(&self, cells: Vec<Option<RawValue>>) -> RawRecord {
        let mut record = RawRecord::new();
        for (field, cell) in self.columns.iter().zip(cells) {
            if let (Some(field), Some(value)) = (field, cell) {
                record.insert(*field, value);
            }
        }
        record
    }
}

/// Turn header + data rows into a parse outcome: blank rows are ignored,
/// rows lacking a name or contact are counted as skipped, and every kept row
/// gets an id.
pub fn collect_rows<I>(headers: &[String], rows: I) -> ParseOutcome
where
    I: IntoIterator<Item = Vec<Option<RawValue>>>,
{
    let map = ColumnMap::from_headers(headers);
    debug!("Mapped columns: {:?}", map.mapped_fields().collect::<Vec<_>>());

    let mut outcome = ParseOutcome::default();
    for (row_idx, cells) in rows.into_iter().enumerate() {
        if cells.iter().all(Option::is_none) {
            continue;
        }
        let mut record = map.record_from_row(cells);
        if record.is_identifiable() {
            record.ensure_id(UPLOAD_ID_PREFIX, Some(row_idx));
        }
        outcome.push(record);
    }
    outcome
}
