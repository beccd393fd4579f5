use calamine::{Reader, Xlsx};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::workbook::{register_sheets, render};
use crate::constants::*;
use crate::domain::{ComplaintRecord, CrimeType, Status};
use crate::error::{RegisterError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::categorize::high_value;
use crate::pipeline::processing::duplicates::{DuplicateDetector, DuplicateGroup};
use crate::pipeline::processing::normalize::fields::{normalize_status, parse_date};
use crate::pipeline::processing::normalize::NormalizedRecord;
use crate::pipeline::processing::parser::excel::{cell_to_value, excel_error, named_sheet};
use crate::pipeline::processing::parser::{RawValue, SourceFormat};

/// Counts from merging a batch into the register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub added: usize,
    /// Incoming records whose id was already present
    pub duplicate_ids: usize,
    /// Of those, how many changed the stored status
    pub status_updates: usize,
}

/// Ordered complaint records keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Register {
    records: Vec<ComplaintRecord>,
    index: HashMap<String, usize>,
}

impl Register {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored rows. A repeated id keeps its first row.
    pub fn from_records(records: Vec<ComplaintRecord>) -> Self {
        let mut register = Self::new();
        for record in records {
            if register.index.contains_key(&record.id) {
                warn!("Register holds id {} more than once; keeping the first row", record.id);
                continue;
            }
            register.push(record);
        }
        register
    }

    fn push(&mut self, record: ComplaintRecord) {
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
    }

    pub fn records(&self) -> &[ComplaintRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ComplaintRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    /// Append records with unseen ids. A known id is skipped, except that a
    /// status reported by the incoming record replaces a differing stored one.
    pub fn merge(&mut self, incoming: &[NormalizedRecord]) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for normalized in incoming {
            let record = &normalized.record;
            match self.index.get(&record.id) {
                Some(&i) => {
                    outcome.duplicate_ids += 1;
                    let stored = &mut self.records[i];
                    if normalized.status_reported && stored.status != record.status {
                        info!("Status of {} changed: {} -> {}", stored.id, stored.status, record.status);
                        stored.status = record.status;
                        outcome.status_updates += 1;
                    } else {
                        debug!("Skipping already registered id {}", record.id);
                    }
                }
                None => {
                    self.push(record.clone());
                    outcome.added += 1;
                }
            }
        }
        outcome
    }
}

/// What a save produced.
#[derive(Debug, Clone, Serialize)]
pub struct SaveSummary {
    pub total_records: usize,
    pub high_value_cases: usize,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub sheets: Vec<String>,
    pub output_file: PathBuf,
}

/// The register file on disk.
pub struct RegisterStore {
    path: PathBuf,
    high_value_threshold: f64,
    detector: DuplicateDetector,
}

impl RegisterStore {
    pub fn new(path: impl Into<PathBuf>, high_value_threshold: f64, detector: DuplicateDetector) -> Self {
        Self {
            path: path.into(),
            high_value_threshold,
            detector,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the master sheet. A missing file is an empty register; a file
    /// that cannot be read is left alone and reported as corrupt.
    pub fn load(&self) -> Result<Register> {
        if !self.path.exists() {
            info!("No register at {}, starting empty", self.path.display());
            return Ok(Register::new());
        }
        let bytes = fs::read(&self.path)?;
        let records = read_master_sheet(bytes).map_err(|e| {
            metrics::register::load_error();
            self.corrupt(e)
        })?;
        info!("Loaded {} records from {}", records.len(), self.path.display());
        Ok(Register::from_records(records))
    }

    fn corrupt(&self, err: RegisterError) -> RegisterError {
        let reason = match err {
            RegisterError::Excel(reason) | RegisterError::CorruptRegister { reason, .. } => reason,
            other => other.to_string(),
        };
        RegisterError::CorruptRegister {
            path: self.path.display().to_string(),
            reason,
        }
    }

    /// Recompute the derived views and replace the register file. The new
    /// workbook is fully built in memory and written to a sibling temp file
    /// before it is renamed over the old one.
    pub fn save(&self, register: &Register) -> Result<SaveSummary> {
        let start_time = std::time::Instant::now();
        let records = register.records();
        let high_value_cases = high_value(records, self.high_value_threshold);
        let duplicate_groups = self.detector.find_groups(records);

        let sheets = register_sheets(records, &high_value_cases, &duplicate_groups);
        let sheet_names = sheets.iter().map(|s| s.name.clone()).collect();
        let bytes = render(&sheets)?;
        self.write_atomic(&bytes)?;

        metrics::register::save_success();
        metrics::register::bytes_written(bytes.len());
        metrics::register::records_total(records.len());
        metrics::register::save_duration(start_time.elapsed().as_secs_f64());
        info!(
            "Wrote {} ({} records, {} high value, {} duplicate groups)",
            self.path.display(),
            records.len(),
            high_value_cases.len(),
            duplicate_groups.len()
        );

        Ok(SaveSummary {
            total_records: records.len(),
            high_value_cases: high_value_cases.len(),
            duplicate_groups,
            sheets: sheet_names,
            output_file: self.path.clone(),
        })
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

fn read_master_sheet(bytes: Vec<u8>) -> Result<Vec<ComplaintRecord>> {
    if SourceFormat::detect(&bytes) != Some(SourceFormat::Xlsx) {
        return Err(RegisterError::Excel("not an .xlsx workbook".to_string()));
    }
    let mut workbook = Xlsx::new(Cursor::new(bytes)).map_err(excel_error)?;
    let range = named_sheet(&mut workbook, MASTER_SHEET)?;

    let mut rows = range.rows();
    let header: HashMap<String, usize> = match rows.next() {
        Some(cells) => cells
            .iter()
            .enumerate()
            .filter_map(|(i, c)| cell_to_value(c).map(|v| (v.as_text().to_lowercase(), i)))
            .collect(),
        None => return Ok(Vec::new()),
    };
    if !header.contains_key(COL_ID) {
        return Err(RegisterError::Excel(format!("{} has no '{}' column", MASTER_SHEET, COL_ID)));
    }

    let mut records = Vec::new();
    for (line, cells) in rows.enumerate() {
        let cell = |column: &str| -> Option<RawValue> {
            header.get(column).and_then(|&i| cells.get(i)).and_then(cell_to_value)
        };
        match stored_record(&cell) {
            Some(record) => records.push(record),
            None => debug!("{} row {} has no id, ignored", MASTER_SHEET, line + 2),
        }
    }
    Ok(records)
}

/// Rebuild a record from a master-sheet row. Values were normalized when
/// first written, so they are taken as they are.
fn stored_record(cell: &dyn Fn(&str) -> Option<RawValue>) -> Option<ComplaintRecord> {
    let text = |column: &str| cell(column).map(|v| v.as_text()).unwrap_or_default();
    let optional = |column: &str| cell(column).map(|v| v.as_text()).filter(|s| !s.is_empty());
    let date = |column: &str| cell(column).as_ref().and_then(parse_date);

    let id = optional(COL_ID)?;
    Some(ComplaintRecord {
        id,
        complaint_date: date(COL_COMPLAINT_DATE),
        incident_date: date(COL_INCIDENT_DATE),
        complainant_name: text(COL_NAME),
        mobile: optional(COL_MOBILE),
        email: optional(COL_EMAIL),
        district: text(COL_DISTRICT),
        police_station: text(COL_POLICE_STATION),
        crime_type: text(COL_CRIME_TYPE).parse::<CrimeType>().unwrap_or(CrimeType::Other),
        platform: text(COL_PLATFORM),
        amount: match cell(COL_AMOUNT) {
            Some(RawValue::Number(n)) => n,
            Some(RawValue::Text(s)) => s.trim().parse().unwrap_or(0.0),
            None => 0.0,
        },
        status: stored_status(&text(COL_STATUS)),
        description: text(COL_DESCRIPTION),
    })
}

fn stored_status(value: &str) -> Status {
    Status::ALL
        .iter()
        .copied()
        .find(|s| s.as_str().eq_ignore_ascii_case(value.trim()))
        .or_else(|| normalize_status(value))
        .unwrap_or_default()
}

/// State of the register file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RegisterHealth {
    Missing,
    Valid { records: usize },
    Corrupt { reason: String },
}

/// Inspect the register without changing it.
pub fn check_register(path: &Path) -> Result<RegisterHealth> {
    if !path.exists() {
        return Ok(RegisterHealth::Missing);
    }
    let bytes = fs::read(path)?;
    match read_master_sheet(bytes) {
        Ok(records) => Ok(RegisterHealth::Valid { records: records.len() }),
        Err(e) => {
            let reason = match e {
                RegisterError::Excel(reason) => reason,
                other => other.to_string(),
            };
            warn!("Register {} is corrupt: {}", path.display(), reason);
            Ok(RegisterHealth::Corrupt { reason })
        }
    }
}

/// Move a corrupt register aside as `<stem>_corrupted_<unix-ts>.xlsx` so the
/// next run starts a fresh one. Returns the new location.
pub fn quarantine_register(path: &Path) -> Result<PathBuf> {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("master_register");
    let target = path.with_file_name(format!("{}_corrupted_{}.xlsx", stem, suffix));
    fs::rename(path, &target)?;
    warn!("Moved corrupt register {} to {}", path.display(), target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::duplicates::DuplicateConfig;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn store(path: &Path) -> RegisterStore {
        RegisterStore::new(path, 50_000.0, DuplicateDetector::new(DuplicateConfig::default()).unwrap())
    }

    fn complaint(id: &str, amount: f64) -> ComplaintRecord {
        ComplaintRecord {
            complainant_name: format!("Person {}", id),
            mobile: Some("9876543210".to_string()),
            complaint_date: NaiveDate::from_ymd_opt(2024, 3, 12),
            crime_type: CrimeType::BankFraud,
            platform: "UPI".to_string(),
            amount,
            status: Status::UnderEnquiry,
            ..ComplaintRecord::with_id(id)
        }
    }

    fn incoming(record: ComplaintRecord, status_reported: bool) -> NormalizedRecord {
        NormalizedRecord {
            record,
            warnings: Vec::new(),
            status_reported,
        }
    }

    #[test]
    fn merge_appends_new_and_counts_known_ids() {
        let mut register = Register::from_records(vec![complaint("A", 1.0)]);
        let mut again = complaint("A", 1.0);
        again.status = Status::Closed;
        let outcome = register.merge(&[
            incoming(complaint("B", 2.0), true),
            incoming(again, true),
            incoming(complaint("B", 2.0), true),
        ]);

        assert_eq!(outcome, MergeOutcome { added: 1, duplicate_ids: 2, status_updates: 1 });
        assert_eq!(register.len(), 2);
        assert_eq!(register.get("A").map(|r| r.status), Some(Status::Closed));
        assert_eq!(register.get("A").map(|r| r.amount), Some(1.0));
    }

    #[test]
    fn unreported_status_keeps_stored_status() {
        let mut stored = complaint("A", 1.0);
        stored.status = Status::Closed;
        let mut register = Register::from_records(vec![stored]);

        // Defaulted to Registered because the upload had no usable status.
        let mut again = complaint("A", 1.0);
        again.status = Status::Registered;
        let outcome = register.merge(&[incoming(again, false)]);

        assert_eq!(outcome, MergeOutcome { added: 0, duplicate_ids: 1, status_updates: 0 });
        assert_eq!(register.get("A").map(|r| r.status), Some(Status::Closed));
    }

    #[test]
    fn save_then_load_keeps_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("register.xlsx");
        let store = store(&path);

        let register = Register::from_records(vec![complaint("A", 75_000.0), complaint("B", 100.0)]);
        let summary = store.save(&register).unwrap();
        assert_eq!(summary.total_records, 2);
        assert_eq!(summary.high_value_cases, 1);
        assert_eq!(summary.duplicate_groups.len(), 0);
        assert_eq!(
            summary.sheets,
            vec![MASTER_SHEET, "Bank_Fraud", HIGH_VALUE_SHEET, DUPLICATES_SHEET]
        );

        let loaded = store.load().unwrap();
        assert_eq!(loaded.records(), register.records());
    }

    #[test]
    fn missing_file_is_empty_register() {
        let dir = tempdir().unwrap();
        let loaded = store(&dir.path().join("none.xlsx")).load().unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn corrupt_file_is_reported_and_left_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("register.xlsx");
        fs::write(&path, b"definitely not a workbook").unwrap();

        let err = store(&path).load().unwrap_err();
        assert!(matches!(err, RegisterError::CorruptRegister { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"definitely not a workbook");
    }

    #[test]
    fn check_and_quarantine() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master_register.xlsx");
        assert_eq!(check_register(&path).unwrap(), RegisterHealth::Missing);

        store(&path).save(&Register::from_records(vec![complaint("A", 1.0)])).unwrap();
        assert_eq!(check_register(&path).unwrap(), RegisterHealth::Valid { records: 1 });

        fs::write(&path, b"PK\x03\x04 truncated").unwrap();
        assert!(matches!(check_register(&path).unwrap(), RegisterHealth::Corrupt { .. }));

        let moved = quarantine_register(&path).unwrap();
        assert!(!path.exists());
        assert!(moved.exists());
        let name = moved.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("master_register_corrupted_"));
        assert!(name.ends_with(".xlsx"));
    }
}
