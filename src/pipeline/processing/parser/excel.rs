use calamine::{DataType, Range, Reader, Xls, Xlsx};
use chrono::{Duration, NaiveDate};
use std::fmt::Display;
use std::io::Cursor;
use tracing::{debug, info};

use super::columns::collect_rows;
use super::{ParseOutcome, Parser, RawValue, SourceFormat};
use crate::error::{RegisterError, Result};

/// Reads the first worksheet of an `.xlsx` or `.xls` workbook.
pub struct ExcelParser {
    format: SourceFormat,
}

impl ExcelParser {
    pub fn new(format: SourceFormat) -> Self {
        Self { format }
    }
}

impl Parser for ExcelParser {
    fn parse(&self, bytes: &[u8]) -> Result<ParseOutcome> {
        debug!("ExcelParser: start format={} bytes_len={}", self.format, bytes.len());
        let cursor = Cursor::new(bytes.to_vec());
        let range = match self.format {
            SourceFormat::Xls => first_sheet(Xls::new(cursor).map_err(excel_error)?)?,
            _ => first_sheet(Xlsx::new(cursor).map_err(excel_error)?)?,
        };

        let mut rows = range.rows();
        let headers: Vec<String> = rows
            .next()
            .ok_or_else(|| RegisterError::NoRecords("worksheet is empty".to_string()))?
            .iter()
            .map(|cell| cell_to_value(cell).map(|v| v.as_text()).unwrap_or_default())
            .collect();

        let data: Vec<Vec<Option<RawValue>>> = rows
            .map(|row| row.iter().map(cell_to_value).collect())
            .collect();
        if data.iter().all(|row| row.iter().all(Option::is_none)) {
            return Err(RegisterError::NoRecords("Excel worksheet".to_string()));
        }

        let outcome = collect_rows(&headers, data);
        info!(
            "ExcelParser: parsed records={} skipped={}",
            outcome.records.len(),
            outcome.skipped
        );
        Ok(outcome)
    }

    fn format(&self) -> SourceFormat {
        self.format
    }
}

/// In-memory workbook source.
pub(crate) type WorkbookBytes = Cursor<Vec<u8>>;

/// First worksheet of an opened workbook.
pub(crate) fn first_sheet<R>(mut workbook: R) -> Result<Range<DataType>>
where
    R: Reader<WorkbookBytes>,
    R::Error: Display,
{
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| RegisterError::Excel("The workbook does not contain any worksheets.".to_string()))?;
    named_sheet(&mut workbook, &sheet_name)
}

/// A worksheet by name.
pub(crate) fn named_sheet<R>(workbook: &mut R, sheet_name: &str) -> Result<Range<DataType>>
where
    R: Reader<WorkbookBytes>,
    R::Error: Display,
{
    workbook
        .worksheet_range(sheet_name)
        .ok_or_else(|| RegisterError::Excel(format!("Unable to read the worksheet named '{}'.", sheet_name)))?
        .map_err(excel_error)
}

pub(crate) fn excel_error<E: Display>(err: E) -> RegisterError {
    RegisterError::Excel(err.to_string())
}

/// Convert a cell; blank and error cells become `None`. Date cells are turned
/// into ISO strings so the normalizer sees one date shape.
pub(crate) fn cell_to_value(cell: &DataType) -> Option<RawValue> {
    match cell {
        DataType::Empty | DataType::Error(_) => None,
        DataType::String(s) if s.trim().is_empty() => None,
        DataType::String(s) => Some(RawValue::Text(s.trim().to_string())),
        DataType::Float(f) => Some(RawValue::Number(*f)),
        DataType::Int(i) => Some(RawValue::Number(*i as f64)),
        DataType::Bool(b) => Some(RawValue::Text(b.to_string())),
        DataType::DateTime(serial) => excel_serial_to_date(*serial).map(|d| RawValue::Text(d.format("%Y-%m-%d").to_string())),
        other => {
            let s = other.to_string();
            (!s.trim().is_empty()).then(|| RawValue::Text(s.trim().to_string()))
        }
    }
}

/// Excel's 1900 date system, counted from 1899-12-30.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.floor() as i64))
}
