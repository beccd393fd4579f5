use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use super::{ParseOutcome, Parser, RawRecord, SourceFormat};
use crate::constants::*;
use crate::error::{RegisterError, Result};

/// Single-complaint PDF layout: one `Label: value` pair per line.
pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for PdfParser {
    fn parse(&self, bytes: &[u8]) -> Result<ParseOutcome> {
        debug!("PdfParser: start bytes_len={}", bytes.len());
        let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| RegisterError::Pdf(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(RegisterError::NoRecords("PDF (no extractable text)".to_string()));
        }

        let mut outcome = ParseOutcome::default();
        match extract_fields_from_text(&text) {
            Some(record) => outcome.push(record),
            None => outcome.skipped += 1,
        }
        info!(
            "PdfParser: parsed records={} skipped={}",
            outcome.records.len(),
            outcome.skipped
        );
        Ok(outcome)
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Pdf
    }
}

fn labeled(labels: &str) -> Regex {
    Regex::new(&format!(r"(?im)^[ \t]*(?:{})[ \t]*[:\-][ \t]*(.+?)[ \t]*$", labels)).unwrap()
}

static LABELED_FIELDS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            COL_ID,
            labeled(r"complaint\s*(?:id|no\.?|number)|acknowledge?ment(?:\s*(?:no\.?|number))?|ack\.?\s*no\.?"),
        ),
        (COL_COMPLAINT_DATE, labeled(r"complaint\s*date|date\s*of\s*complaint|reported\s*on")),
        (COL_INCIDENT_DATE, labeled(r"incident\s*date|date\s*of\s*incident")),
        (COL_NAME, labeled(r"complainant\s*name|name\s*of\s*complainant|victim\s*name|name")),
        (COL_MOBILE, labeled(r"mobile(?:\s*no\.?|\s*number)?|phone(?:\s*no\.?|\s*number)?|contact(?:\s*no\.?|\s*number)?")),
        (COL_EMAIL, labeled(r"e-?mail(?:\s*id|\s*address)?")),
        (COL_DISTRICT, labeled(r"district")),
        (COL_POLICE_STATION, labeled(r"police\s*station|p\.?s\.?")),
        (COL_AMOUNT, labeled(r"amount(?:\s*lost|\s*involved)?|loss\s*amount|fraud\s*amount|loss")),
        (COL_CRIME_TYPE, labeled(r"crime\s*type|category|type\s*of\s*crime")),
        (COL_PLATFORM, labeled(r"platform|medium|mode\s*of\s*payment")),
        (COL_STATUS, labeled(r"status|case\s*status")),
    ]
});

// Everything after the description label, across lines.
static DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ims)^[ \t]*(?:description|incident\s*details|complaint\s*details|details)[ \t]*[:\-][ \t]*(.+)\z")
        .unwrap()
});

static EMAIL_ANYWHERE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap());

/// Pull the labeled fields out of extracted PDF text. Returns `None` when the
/// text carries no complainant name or contact. A PDF without a description
/// label uses the whole text as its description.
pub fn extract_fields_from_text(text: &str) -> Option<RawRecord> {
    let mut record = RawRecord::new();
    for (field, pattern) in LABELED_FIELDS.iter() {
        if let Some(caps) = pattern.captures(text) {
            record.insert(*field, caps[1].trim());
        }
    }

    if !record.has(COL_EMAIL) {
        if let Some(m) = EMAIL_ANYWHERE.find(text) {
            record.insert(COL_EMAIL, m.as_str());
        }
    }

    match DESCRIPTION.captures(text) {
        Some(caps) => record.insert(COL_DESCRIPTION, caps[1].trim()),
        None => record.insert(COL_DESCRIPTION, text.trim()),
    }

    if !record.is_identifiable() {
        debug!("PDF text has no complainant name or contact");
        return None;
    }
    record.ensure_id(UPLOAD_ID_PREFIX, None);
    Some(record)
}
