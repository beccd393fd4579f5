use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

use crate::constants::{COL_EMAIL, COL_ID, COL_MOBILE, COL_NAME};
use crate::error::{RegisterError, Result};
use crate::observability::metrics;

pub mod columns;
pub mod csv;
pub mod excel;
pub mod pdf;

pub use self::csv::CsvParser;
pub use self::excel::ExcelParser;
pub use self::pdf::PdfParser;

/// A single cell value as it came out of the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// String form of the value. Whole numbers print without a fraction so
    /// that numeric ids and phone numbers survive spreadsheet cells.
    pub fn as_text(&self) -> String {
        match self {
            RawValue::Text(s) => s.trim().to_string(),
            RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e16 => format!("{:.0}", n),
            RawValue::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

/// Field mapping extracted from one row, page or form submission. Keys are
/// the canonical column names from `constants`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value; blank text is ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<RawValue>) {
        let value = value.into();
        if let RawValue::Text(s) = &value {
            if s.trim().is_empty() {
                return;
            }
        }
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.fields.get(key)
    }

    /// Trimmed, non-empty string form of a field.
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .map(RawValue::as_text)
            .filter(|s| !s.is_empty())
    }

    pub fn has(&self, key: &str) -> bool {
        self.text(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RawValue)> {
        self.fields.iter()
    }

    /// A record is kept only if it names a complainant or carries a contact.
    pub fn is_identifiable(&self) -> bool {
        self.has(COL_NAME) || self.has(COL_MOBILE) || self.has(COL_EMAIL)
    }

    /// Fill in a deterministic id when the source did not provide one.
    /// `salt` distinguishes otherwise identical rows of the same file.
    pub fn ensure_id(&mut self, prefix: &str, salt: Option<usize>) {
        if !self.has(COL_ID) {
            let id = generate_id(prefix, self, salt);
            self.fields.insert(COL_ID.to_string(), RawValue::Text(id));
        }
    }
}

impl FromIterator<(String, RawValue)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (String, RawValue)>>(iter: T) -> Self {
        let mut record = RawRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// `PREFIX_` followed by the first 12 hex digits of a SHA-256 over the
/// record's fields. Same content (and salt) always gives the same id.
pub fn generate_id(prefix: &str, record: &RawRecord, salt: Option<usize>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in record.iter().filter(|(k, _)| k.as_str() != COL_ID) {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_text().to_lowercase().as_bytes());
        hasher.update(b"\n");
    }
    if let Some(salt) = salt {
        hasher.update(format!("#row={}", salt).as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("{}_{}", prefix, digest[..12].to_uppercase())
}

/// Result of parsing one input: the identifiable records plus a count of
/// entries that were dropped.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub records: Vec<RawRecord>,
    pub skipped: usize,
}

impl ParseOutcome {
    /// Route a candidate record into `records` or the skipped count.
    pub fn push(&mut self, record: RawRecord) {
        if record.is_identifiable() {
            self.records.push(record);
        } else {
            debug!("Dropping entry without name or contact: {:?}", record);
            self.skipped += 1;
        }
    }
}

pub trait Parser {
    fn parse(&self, bytes: &[u8]) -> Result<ParseOutcome>;

    fn format(&self) -> SourceFormat;
}

/// A wrapper that adds metrics to any parser implementation
pub struct MetricsParser<P: Parser> {
    inner: P,
}

impl<P: Parser> MetricsParser<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: Parser> Parser for MetricsParser<P> {
    fn parse(&self, bytes: &[u8]) -> Result<ParseOutcome> {
        let start_time = std::time::Instant::now();
        metrics::parser::bytes_processed(bytes.len());

        match self.inner.parse(bytes) {
            Ok(outcome) => {
                metrics::parser::parse_success(self.inner.format().as_str());
                metrics::parser::records_extracted(outcome.records.len() as u64);
                metrics::parser::records_skipped(outcome.skipped as u64);
                metrics::parser::duration(start_time.elapsed().as_secs_f64());
                Ok(outcome)
            }
            Err(e) => {
                metrics::parser::parse_error(self.inner.format().as_str());
                metrics::parser::duration(start_time.elapsed().as_secs_f64());
                Err(e)
            }
        }
    }

    fn format(&self) -> SourceFormat {
        self.inner.format()
    }
}

/// Input file formats understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Xlsx,
    Xls,
    Pdf,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Xlsx => "xlsx",
            SourceFormat::Xls => "xls",
            SourceFormat::Pdf => "pdf",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" => Some(SourceFormat::Csv),
            "xlsx" => Some(SourceFormat::Xlsx),
            "xls" => Some(SourceFormat::Xls),
            "pdf" => Some(SourceFormat::Pdf),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Sniff the format from the file signature.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

        if bytes.starts_with(b"%PDF-") {
            return Some(SourceFormat::Pdf);
        }
        if bytes.starts_with(b"PK\x03\x04") {
            // Zip entry names are stored uncompressed in the local headers.
            if contains(bytes, b"[Content_Types].xml") && contains(bytes, b"xl/") {
                return Some(SourceFormat::Xlsx);
            }
            return None;
        }
        if bytes.starts_with(OLE2_MAGIC) {
            return Some(SourceFormat::Xls);
        }
        let head = &bytes[..bytes.len().min(4096)];
        let first_line = head.split(|&b| b == b'\n').next().unwrap_or_default();
        match std::str::from_utf8(first_line) {
            Ok(line) if line.contains(',') || line.contains(';') => Some(SourceFormat::Csv),
            _ => None,
        }
    }

    /// Decide the format from content and the declared/extension format.
    /// Content wins when recognisable; a disagreement aborts.
    pub fn resolve(bytes: &[u8], declared: Option<SourceFormat>, label: &str) -> Result<Self> {
        if bytes.is_empty() {
            return Err(RegisterError::EmptyInput);
        }
        match (Self::detect(bytes), declared) {
            (Some(detected), Some(declared)) if detected != declared => Err(RegisterError::FormatMismatch {
                declared: declared.to_string(),
                detected: detected.to_string(),
            }),
            (Some(detected), _) => Ok(detected),
            (None, Some(declared)) => {
                debug!("Could not sniff {}; trusting declared format {}", label, declared);
                Ok(declared)
            }
            (None, None) => Err(RegisterError::UnsupportedFormat {
                extension: Path::new(label)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("none")
                    .to_string(),
            }),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Pick the parser for a format.
pub fn parser_for(format: SourceFormat) -> Box<dyn Parser> {
    match format {
        SourceFormat::Csv => Box::new(MetricsParser::new(CsvParser::new())),
        SourceFormat::Xlsx | SourceFormat::Xls => Box::new(MetricsParser::new(ExcelParser::new(format))),
        SourceFormat::Pdf => Box::new(MetricsParser::new(PdfParser::new())),
    }
}

/// Resolve the format of `bytes` and parse them.
pub fn parse_input(bytes: &[u8], declared: Option<SourceFormat>, label: &str) -> Result<(SourceFormat, ParseOutcome)> {
    let format = SourceFormat::resolve(bytes, declared, label)?;
    let outcome = parser_for(format).parse(bytes)?;
    if outcome.skipped > 0 {
        warn!("{}: skipped {} entries without a name or contact field", label, outcome.skipped);
    }
    Ok((format, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_formats_from_signatures() {
        assert_eq!(SourceFormat::detect(b"%PDF-1.4\n..."), Some(SourceFormat::Pdf));
        assert_eq!(
            SourceFormat::detect(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0x00]),
            Some(SourceFormat::Xls)
        );
        assert_eq!(
            SourceFormat::detect(b"PK\x03\x04....[Content_Types].xml....xl/workbook.xml"),
            Some(SourceFormat::Xlsx)
        );
        assert_eq!(SourceFormat::detect(b"Complaint ID,Name\nA1,Ravi\n"), Some(SourceFormat::Csv));
        assert_eq!(SourceFormat::detect(b"just some words\n"), None);
    }

    #[test]
    fn resolve_rejects_mismatched_extension() {
        let err = SourceFormat::resolve(b"%PDF-1.7", Some(SourceFormat::Xlsx), "upload.xlsx").unwrap_err();
        assert!(matches!(err, RegisterError::FormatMismatch { .. }));
    }

    #[test]
    fn resolve_falls_back_to_declared_format() {
        let format = SourceFormat::resolve(b"single column\nvalue\n", Some(SourceFormat::Csv), "a.csv").unwrap();
        assert_eq!(format, SourceFormat::Csv);
    }

    #[test]
    fn resolve_rejects_empty_and_unknown_input() {
        assert!(matches!(
            SourceFormat::resolve(b"", Some(SourceFormat::Csv), "a.csv"),
            Err(RegisterError::EmptyInput)
        ));
        assert!(matches!(
            SourceFormat::resolve(b"hello", None, "notes.txt"),
            Err(RegisterError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn generated_ids_are_deterministic_and_salted() {
        let mut record = RawRecord::new();
        record.insert(COL_NAME, "Ravi Kumar");
        record.insert(COL_MOBILE, "9876543210");

        let a = generate_id("COMP", &record, Some(0));
        let b = generate_id("COMP", &record, Some(0));
        let c = generate_id("COMP", &record, Some(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("COMP_"));
        assert_eq!(a.len(), "COMP_".len() + 12);
    }

    #[test]
    fn numeric_values_print_without_fraction() {
        assert_eq!(RawValue::Number(9876543210.0).as_text(), "9876543210");
        assert_eq!(RawValue::Number(1250.5).as_text(), "1250.5");
    }

    #[test]
    fn outcome_counts_unidentifiable_records() {
        let mut outcome = ParseOutcome::default();
        let mut good = RawRecord::new();
        good.insert(COL_EMAIL, "a@b.com");
        let mut bad = RawRecord::new();
        bad.insert("amount", "500");
        outcome.push(good);
        outcome.push(bad);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.skipped, 1);
    }
}
