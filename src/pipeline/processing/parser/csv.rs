use ::csv::{ReaderBuilder, Trim};
use std::borrow::Cow;
use tracing::{debug, info, warn};

use super::columns::collect_rows;
use super::{ParseOutcome, Parser, RawValue, SourceFormat};
use crate::error::{RegisterError, Result};

/// Header-based CSV parser. Accepts `,` or `;` delimited files in UTF-8, with
/// a Latin-1 fallback for exports from older spreadsheet tools.
pub struct CsvParser;

impl CsvParser {
    pub fn new() -> Self {
        Self
    }

    fn decode(bytes: &[u8]) -> Cow<'_, str> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
        match std::str::from_utf8(bytes) {
            Ok(s) => Cow::Borrowed(s),
            Err(_) => {
                debug!("CSV is not valid UTF-8, decoding as Latin-1");
                Cow::Owned(bytes.iter().map(|&b| b as char).collect())
            }
        }
    }

    fn delimiter(text: &str) -> u8 {
        let first_line = text.lines().next().unwrap_or_default();
        if first_line.contains(';') && !first_line.contains(',') {
            b';'
        } else {
            b','
        }
    }
}

impl Default for CsvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for CsvParser {
    fn parse(&self, bytes: &[u8]) -> Result<ParseOutcome> {
        debug!("CsvParser: start bytes_len={}", bytes.len());
        let text = Self::decode(bytes);
        let mut reader = ReaderBuilder::new()
            .delimiter(Self::delimiter(&text))
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(RegisterError::NoRecords("CSV file has no header row".to_string()));
        }

        let mut rows = Vec::new();
        let mut malformed = 0usize;
        for (line, result) in reader.records().enumerate() {
            match result {
                Ok(row) => rows.push(
                    row.iter()
                        .map(|cell| (!cell.is_empty()).then(|| RawValue::Text(cell.to_string())))
                        .collect::<Vec<_>>(),
                ),
                Err(e) => {
                    warn!("CsvParser: unreadable row {}: {}", line + 2, e);
                    malformed += 1;
                }
            }
        }
        if rows.is_empty() && malformed == 0 {
            return Err(RegisterError::NoRecords("CSV file".to_string()));
        }

        let mut outcome = collect_rows(&headers, rows);
        outcome.skipped += malformed;
        info!(
            "CsvParser: parsed records={} skipped={}",
            outcome.records.len(),
            outcome.skipped
        );
        Ok(outcome)
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Csv
    }
}
