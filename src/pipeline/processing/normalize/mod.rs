use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::*;
use crate::domain::{ComplaintRecord, CrimeType, Status};
use crate::observability::metrics;
use crate::pipeline::processing::categorize::Categorizer;
use crate::pipeline::processing::parser::{generate_id, RawRecord, RawValue};

pub mod fields;

use self::fields::{collapse_whitespace, normalize_email, normalize_mobile, normalize_status, parse_amount, parse_date, title_case};

/// A field that could not be interpreted. The record is kept with the field
/// left empty (or at its default) and the warning travels with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldWarning {
    pub field: String,
    pub value: String,
    pub reason: String,
}

impl FieldWarning {
    fn new(field: &str, value: &RawValue, reason: &str) -> Self {
        Self {
            field: field.to_string(),
            value: value.as_text(),
            reason: reason.to_string(),
        }
    }
}

/// A raw mapping converted into the canonical complaint shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub record: ComplaintRecord,
    pub warnings: Vec<FieldWarning>,
    /// The source carried a recognised status. Only then may the record
    /// change the status of an already registered complaint.
    pub status_reported: bool,
}

/// Trait for normalizing raw field mappings into canonical complaint records
pub trait Normalizer {
    /// Field-level problems never fail the record; they become warnings.
    fn normalize(&self, record: &RawRecord) -> NormalizedRecord;
}

/// Default normalizer. Crime type and platform inference are delegated to
/// the keyword categorizer.
pub struct DefaultNormalizer {
    categorizer: Categorizer,
}

impl DefaultNormalizer {
    pub fn new(categorizer: Categorizer) -> Self {
        Self { categorizer }
    }

    fn text_field(raw: &RawRecord, field: &str) -> String {
        raw.text(field).map(|s| title_case(&s)).unwrap_or_default()
    }

    fn date_field(raw: &RawRecord, field: &str, warnings: &mut Vec<FieldWarning>) -> Option<chrono::NaiveDate> {
        let value = raw.get(field)?;
        let parsed = parse_date(value);
        if parsed.is_none() {
            warnings.push(FieldWarning::new(field, value, "unrecognised date format"));
        }
        parsed
    }

    fn crime_type(&self, raw: &RawRecord) -> CrimeType {
        let raw_type = raw.text(COL_CRIME_TYPE);
        if let Some(known) = raw_type.as_deref().and_then(|t| t.parse::<CrimeType>().ok()) {
            return known;
        }
        let search_text = [raw.text(COL_DESCRIPTION), raw_type, raw.text(COL_PLATFORM)]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        self.categorizer.categorize(&search_text)
    }

    fn platform(&self, raw: &RawRecord) -> String {
        if let Some(platform) = raw.text(COL_PLATFORM) {
            return title_case(&platform);
        }
        let search_text = [raw.text(COL_DESCRIPTION), raw.text(COL_CRIME_TYPE)]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        self.categorizer
            .infer_platform(&search_text)
            .unwrap_or("Other")
            .to_string()
    }
}

impl Default for DefaultNormalizer {
    fn default() -> Self {
        Self::new(Categorizer::default())
    }
}

impl Normalizer for DefaultNormalizer {
    fn normalize(&self, raw: &RawRecord) -> NormalizedRecord {
        let mut warnings = Vec::new();

        let id = raw
            .text(COL_ID)
            .unwrap_or_else(|| generate_id(UPLOAD_ID_PREFIX, raw, None))
            .trim()
            .to_uppercase();

        let mobile = raw.get(COL_MOBILE).and_then(|value| {
            let mobile = normalize_mobile(value);
            if mobile.is_none() {
                warnings.push(FieldWarning::new(COL_MOBILE, value, "fewer than 10 digits"));
            }
            mobile
        });

        let email = raw.get(COL_EMAIL).and_then(|value| {
            let email = normalize_email(&value.as_text());
            if email.is_none() {
                warnings.push(FieldWarning::new(COL_EMAIL, value, "not an e-mail address"));
            }
            email
        });

        let amount = match raw.get(COL_AMOUNT) {
            Some(value) => parse_amount(value).unwrap_or_else(|| {
                warnings.push(FieldWarning::new(COL_AMOUNT, value, "no numeric amount"));
                0.0
            }),
            None => 0.0,
        };

        let reported_status = raw.get(COL_STATUS).and_then(|value| {
            let status = normalize_status(&value.as_text());
            if status.is_none() {
                warnings.push(FieldWarning::new(COL_STATUS, value, "unknown status, using Registered"));
            }
            status
        });
        let status = reported_status.unwrap_or(Status::Registered);

        let complaint_date = Self::date_field(raw, COL_COMPLAINT_DATE, &mut warnings);
        let incident_date = Self::date_field(raw, COL_INCIDENT_DATE, &mut warnings);

        let record = ComplaintRecord {
            id,
            complaint_date,
            incident_date,
            complainant_name: Self::text_field(raw, COL_NAME),
            mobile,
            email,
            district: Self::text_field(raw, COL_DISTRICT),
            police_station: Self::text_field(raw, COL_POLICE_STATION),
            crime_type: self.crime_type(raw),
            platform: self.platform(raw),
            amount,
            status,
            description: raw.text(COL_DESCRIPTION).map(|d| collapse_whitespace(&d)).unwrap_or_default(),
        };

        for w in &warnings {
            warn!("Record {}: field '{}' value '{}': {}", record.id, w.field, w.value, w.reason);
        }
        debug!("Normalized {} as {} / {}", record.id, record.crime_type, record.platform);
        NormalizedRecord {
            record,
            warnings,
            status_reported: reported_status.is_some(),
        }
    }
}

/// Normalize a batch, recording per-batch metrics.
pub fn normalize_all<N: Normalizer + ?Sized>(normalizer: &N, records: &[RawRecord]) -> Vec<NormalizedRecord> {
    let start_time = std::time::Instant::now();
    let normalized: Vec<NormalizedRecord> = records.iter().map(|r| normalizer.normalize(r)).collect();
    let warning_count: usize = normalized.iter().map(|n| n.warnings.len()).sum();

    metrics::normalize::records_processed(normalized.len() as u64);
    metrics::normalize::warnings(warning_count as u64);
    metrics::normalize::duration(start_time.elapsed().as_secs_f64());
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), RawValue::from(*v)))
            .collect()
    }

    #[test]
    fn normalizes_a_full_row() {
        let normalizer = DefaultNormalizer::default();
        let result = normalizer.normalize(&raw(&[
            (COL_ID, " ack-101 "),
            (COL_COMPLAINT_DATE, "12/03/2024"),
            (COL_NAME, "ravi   KUMAR"),
            (COL_MOBILE, "+91 98765 43210"),
            (COL_EMAIL, " Ravi@Example.COM "),
            (COL_DISTRICT, "pune"),
            (COL_AMOUNT, "₹75,000"),
            (COL_STATUS, "fir registered"),
            (COL_DESCRIPTION, "Money  transferred via UPI\nto unknown handle"),
        ]));

        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert!(result.status_reported);
        let r = result.record;
        assert_eq!(r.id, "ACK-101");
        assert_eq!(r.complaint_date, NaiveDate::from_ymd_opt(2024, 3, 12));
        assert_eq!(r.incident_date, None);
        assert_eq!(r.complainant_name, "Ravi Kumar");
        assert_eq!(r.mobile.as_deref(), Some("9876543210"));
        assert_eq!(r.email.as_deref(), Some("ravi@example.com"));
        assert_eq!(r.district, "Pune");
        assert_eq!(r.amount, 75_000.0);
        assert_eq!(r.status, Status::FirFiled);
        assert_eq!(r.crime_type, CrimeType::UpiFraud);
        assert_eq!(r.platform, "UPI");
        assert_eq!(r.description, "Money transferred via UPI to unknown handle");
    }

    #[test]
    fn bad_fields_become_warnings() {
        let normalizer = DefaultNormalizer::default();
        let result = normalizer.normalize(&raw(&[
            (COL_ID, "X1"),
            (COL_NAME, "Asha"),
            (COL_COMPLAINT_DATE, "sometime last week"),
            (COL_MOBILE, "12345"),
            (COL_EMAIL, "asha at example"),
            (COL_AMOUNT, "unknown"),
        ]));

        let r = &result.record;
        assert_eq!(r.complaint_date, None);
        assert_eq!(r.mobile, None);
        assert_eq!(r.email, None);
        assert_eq!(r.amount, 0.0);
        let fields: Vec<&str> = result.warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields.len(), 4);
        for f in [COL_COMPLAINT_DATE, COL_MOBILE, COL_EMAIL, COL_AMOUNT] {
            assert!(fields.contains(&f), "missing warning for {}", f);
        }
    }

    #[test]
    fn explicit_crime_type_is_honoured() {
        let normalizer = DefaultNormalizer::default();
        let result = normalizer.normalize(&raw(&[
            (COL_NAME, "Asha"),
            (COL_CRIME_TYPE, "Job Scam"),
            (COL_DESCRIPTION, "paid via upi"),
        ]));
        assert_eq!(result.record.crime_type, CrimeType::JobScam);
    }

    #[test]
    fn free_text_crime_type_is_categorized() {
        let normalizer = DefaultNormalizer::default();
        let result = normalizer.normalize(&raw(&[(COL_NAME, "Asha"), (COL_CRIME_TYPE, "instagram impersonation")]));
        assert_eq!(result.record.crime_type, CrimeType::SocialMedia);
        assert_eq!(result.record.platform, "Social Media");
    }

    #[test]
    fn defaults_when_fields_are_absent() {
        let normalizer = DefaultNormalizer::default();
        let result = normalizer.normalize(&raw(&[(COL_NAME, "Asha")]));
        let r = &result.record;
        assert!(result.warnings.is_empty());
        assert!(!result.status_reported);
        assert!(r.id.starts_with("COMP_"));
        assert_eq!(r.status, Status::Registered);
        assert_eq!(r.crime_type, CrimeType::Other);
        assert_eq!(r.platform, "Other");
        assert_eq!(r.amount, 0.0);
    }

    #[test]
    fn provided_platform_is_title_cased() {
        let normalizer = DefaultNormalizer::default();
        let result = normalizer.normalize(&raw(&[(COL_NAME, "Asha"), (COL_PLATFORM, "whatsapp")]));
        assert_eq!(result.record.platform, "Whatsapp");
        assert_eq!(result.record.crime_type, CrimeType::SocialMedia);
    }

    #[test]
    fn unrecognised_status_is_not_reported() {
        let normalizer = DefaultNormalizer::default();
        let result = normalizer.normalize(&raw(&[(COL_NAME, "Asha"), (COL_STATUS, "escalated")]));
        assert_eq!(result.record.status, Status::Registered);
        assert!(!result.status_reported);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].field, COL_STATUS);
    }
}
