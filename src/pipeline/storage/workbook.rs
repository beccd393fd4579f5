//! Register workbook layout: which sheets exist, their columns, and the
//! header cosmetics. Produces an in-memory `.xlsx`; the caller decides where
//! the bytes go.

use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, Worksheet};
use tracing::debug;

use crate::constants::*;
use crate::domain::ComplaintRecord;
use crate::error::Result;
use crate::pipeline::processing::categorize::split_by_category;
use crate::pipeline::processing::duplicates::{DuplicateGroup, MatchReason};

/// A cell as it will be written.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    fn display_len(&self) -> usize {
        match self {
            Cell::Text(s) => s.chars().count(),
            Cell::Number(n) => n.to_string().len(),
        }
    }
}

fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
}

fn optional(s: &Option<String>) -> Cell {
    Cell::Text(s.clone().unwrap_or_default())
}

/// Value of one named column for a record. Dates are ISO text.
pub fn record_cell(record: &ComplaintRecord, column: &str) -> Cell {
    match column {
        COL_ID => text(&record.id),
        COL_COMPLAINT_DATE => Cell::Text(record.complaint_date.map(|d| d.to_string()).unwrap_or_default()),
        COL_INCIDENT_DATE => Cell::Text(record.incident_date.map(|d| d.to_string()).unwrap_or_default()),
        COL_NAME => text(&record.complainant_name),
        COL_MOBILE => optional(&record.mobile),
        COL_EMAIL => optional(&record.email),
        COL_DISTRICT => text(&record.district),
        COL_POLICE_STATION => text(&record.police_station),
        COL_CRIME_TYPE => text(record.crime_type.as_str()),
        COL_PLATFORM => text(&record.platform),
        COL_AMOUNT => Cell::Number(record.amount),
        COL_STATUS => text(record.status.as_str()),
        COL_DESCRIPTION => text(&record.description),
        _ => Cell::Text(String::new()),
    }
}

/// One sheet's worth of data before formatting.
#[derive(Debug, Clone)]
pub struct SheetData {
    pub name: String,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl SheetData {
    fn from_records<'a, I>(name: &str, columns: &[&'static str], records: I) -> Self
    where
        I: IntoIterator<Item = &'a ComplaintRecord>,
    {
        let rows = records
            .into_iter()
            .map(|r| columns.iter().map(|c| record_cell(r, c)).collect())
            .collect();
        Self {
            name: sheet_name(name),
            columns: columns.to_vec(),
            rows,
        }
    }

    /// Auto-sized column widths: longest value plus padding, capped.
    pub fn column_widths(&self) -> Vec<usize> {
        (0..self.columns.len())
            .map(|col| {
                let longest = self
                    .rows
                    .iter()
                    .filter_map(|row| row.get(col))
                    .map(Cell::display_len)
                    .chain(std::iter::once(self.columns[col].len()))
                    .max()
                    .unwrap_or(0);
                (longest + 2).min(MAX_COLUMN_WIDTH)
            })
            .collect()
    }
}

/// Excel rejects sheet names longer than 31 characters.
pub fn sheet_name(name: &str) -> String {
    name.chars().take(MAX_SHEET_NAME_LEN).collect()
}

/// Every sheet of the register, in workbook order: master, one per
/// non-empty crime type, high-value cases, possible duplicates.
pub fn register_sheets(
    records: &[ComplaintRecord],
    high_value: &[&ComplaintRecord],
    groups: &[DuplicateGroup],
) -> Vec<SheetData> {
    let mut sheets = vec![SheetData::from_records(MASTER_SHEET, MASTER_COLUMNS, records)];

    for (crime_type, members) in split_by_category(records) {
        sheets.push(SheetData::from_records(
            crime_type.as_str(),
            CATEGORY_COLUMNS,
            members.into_iter(),
        ));
    }

    sheets.push(SheetData::from_records(
        HIGH_VALUE_SHEET,
        HIGH_VALUE_COLUMNS,
        high_value.iter().copied(),
    ));
    sheets.push(duplicates_sheet(records, groups));
    sheets
}

fn duplicates_sheet(records: &[ComplaintRecord], groups: &[DuplicateGroup]) -> SheetData {
    let mut rows = Vec::new();
    for group in groups {
        for member in &group.members {
            let Some(record) = records.get(member.position) else {
                continue;
            };
            let row = DUPLICATE_COLUMNS
                .iter()
                .map(|column| match *column {
                    COL_GROUP_ID => text(&group.label),
                    COL_MATCH_REASON => Cell::Text(MatchReason::join(&member.reasons)),
                    COL_GROUP_SIZE => Cell::Number(group.size() as f64),
                    other => record_cell(record, other),
                })
                .collect();
            rows.push(row);
        }
    }
    SheetData {
        name: DUPLICATES_SHEET.to_string(),
        columns: DUPLICATE_COLUMNS.to_vec(),
        rows,
    }
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x366092))
        .set_border(FormatBorder::Thin)
}

fn body_format() -> Format {
    Format::new().set_border(FormatBorder::Thin)
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &SheetData) -> Result<()> {
    let header = header_format();
    let body = body_format();
    worksheet.set_name(&sheet.name)?;

    for (col, name) in sheet.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *name, &header)?;
    }
    for (row_idx, row) in sheet.rows.iter().enumerate() {
        let row_num = (row_idx + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                Cell::Text(s) => worksheet.write_string_with_format(row_num, col as u16, s, &body)?,
                Cell::Number(n) => worksheet.write_number_with_format(row_num, col as u16, *n, &body)?,
            };
        }
    }
    for (col, width) in sheet.column_widths().into_iter().enumerate() {
        worksheet.set_column_width(col as u16, width as f64)?;
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

/// Serialise the sheets into `.xlsx` bytes.
pub fn render(sheets: &[SheetData]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    for sheet in sheets {
        debug!("Writing sheet {} rows={}", sheet.name, sheet.rows.len());
        let worksheet = workbook.add_worksheet();
        write_sheet(worksheet, sheet)?;
    }
    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CrimeType;
    use crate::pipeline::processing::duplicates::GroupMember;
    use std::collections::BTreeSet;

    fn record(id: &str, crime_type: CrimeType, amount: f64) -> ComplaintRecord {
        ComplaintRecord {
            crime_type,
            amount,
            complainant_name: format!("Person {}", id),
            ..ComplaintRecord::with_id(id)
        }
    }

    #[test]
    fn sheet_set_always_has_derived_sheets() {
        let records = vec![record("A", CrimeType::UpiFraud, 10.0)];
        let names: Vec<String> = register_sheets(&records, &[], &[]).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec![MASTER_SHEET, "UPI_Fraud", HIGH_VALUE_SHEET, DUPLICATES_SHEET]);
    }

    #[test]
    fn empty_register_still_has_headers() {
        let sheets = register_sheets(&[], &[], &[]);
        assert_eq!(sheets.len(), 3);
        assert!(sheets.iter().all(|s| s.rows.is_empty() && !s.columns.is_empty()));
    }

    #[test]
    fn duplicate_rows_carry_group_and_member_reasons() {
        let records = vec![record("A", CrimeType::Other, 1.0), record("B", CrimeType::Other, 1.0)];
        let group = DuplicateGroup {
            label: "DUPLICATE_GROUP_1".to_string(),
            members: vec![
                GroupMember { position: 0, id: "A".into(), reasons: BTreeSet::from([MatchReason::SameMobile]) },
                GroupMember {
                    position: 1,
                    id: "B".into(),
                    reasons: BTreeSet::from([MatchReason::SameMobile, MatchReason::SameEmail]),
                },
            ],
            reasons: BTreeSet::from([MatchReason::SameMobile, MatchReason::SameEmail]),
        };
        let sheet = duplicates_sheet(&records, &[group]);
        assert_eq!(sheet.rows.len(), 2);
        let reason_col = DUPLICATE_COLUMNS.iter().position(|c| *c == COL_MATCH_REASON).unwrap();
        let size_col = DUPLICATE_COLUMNS.iter().position(|c| *c == COL_GROUP_SIZE).unwrap();
        assert_eq!(sheet.rows[1][reason_col], Cell::Text("Same Mobile Number; Same Email".into()));
        assert_eq!(sheet.rows[0][size_col], Cell::Number(2.0));
        assert_eq!(sheet.rows[0][0], Cell::Text("DUPLICATE_GROUP_1".into()));
    }

    #[test]
    fn widths_are_capped() {
        let mut long = record("A", CrimeType::Other, 1.0);
        long.description = "x".repeat(400);
        let sheets = register_sheets(&[long], &[], &[]);
        let widths = sheets[0].column_widths();
        assert!(widths.iter().all(|w| *w <= MAX_COLUMN_WIDTH));
        assert_eq!(widths.last().copied(), Some(MAX_COLUMN_WIDTH));
    }

    #[test]
    fn renders_a_zip_container() {
        let bytes = render(&register_sheets(&[record("A", CrimeType::Other, 1.0)], &[], &[])).unwrap();
        assert!(bytes.starts_with(b"PK\x03\x04"));
    }
}
