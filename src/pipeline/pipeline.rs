use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::constants::FORM_ID_PREFIX;
use crate::error::{RegisterError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::categorize::Categorizer;
use crate::pipeline::processing::duplicates::DuplicateDetector;
use crate::pipeline::processing::normalize::{normalize_all, DefaultNormalizer, FieldWarning, NormalizedRecord, Normalizer};
use crate::pipeline::processing::parser::{parse_input, RawRecord, SourceFormat};
use crate::pipeline::storage::{MergeOutcome, Register, RegisterStore, SaveSummary};

/// Field warnings of one record
#[derive(Debug, Clone, Serialize)]
pub struct RecordWarnings {
    pub id: String,
    pub warnings: Vec<FieldWarning>,
}

/// Result of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub source_format: Option<SourceFormat>,
    /// Records the parser produced
    pub parsed: usize,
    /// Records appended to the register
    pub added: usize,
    /// Incoming records whose id was already registered
    pub duplicate_ids: usize,
    pub status_updates: usize,
    /// Source entries dropped for lacking a name or contact
    pub skipped_unparsed: usize,
    pub field_warnings: Vec<RecordWarnings>,
    pub total_records: usize,
    pub duplicate_groups: usize,
    pub high_value_cases: usize,
    pub sheets: Vec<String>,
    pub output_file: PathBuf,
}

impl PipelineResult {
    fn new(
        run_id: Uuid,
        source_format: Option<SourceFormat>,
        parsed: usize,
        skipped_unparsed: usize,
        normalized: &[NormalizedRecord],
        merge: MergeOutcome,
        saved: SaveSummary,
    ) -> Self {
        let field_warnings = normalized
            .iter()
            .filter(|n| !n.warnings.is_empty())
            .map(|n| RecordWarnings {
                id: n.record.id.clone(),
                warnings: n.warnings.clone(),
            })
            .collect();
        Self {
            run_id,
            source_format,
            parsed,
            added: merge.added,
            duplicate_ids: merge.duplicate_ids,
            status_updates: merge.status_updates,
            skipped_unparsed,
            field_warnings,
            total_records: saved.total_records,
            duplicate_groups: saved.duplicate_groups.len(),
            high_value_cases: saved.high_value_cases,
            sheets: saved.sheets,
            output_file: saved.output_file,
        }
    }
}

/// One request-scoped run: parse, normalize, merge into the register,
/// rebuild the derived sheets and write the file.
pub struct Pipeline {
    normalizer: Box<dyn Normalizer>,
    store: RegisterStore,
}

impl Pipeline {
    pub fn new(normalizer: Box<dyn Normalizer>, store: RegisterStore) -> Self {
        Self { normalizer, store }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let categorizer = Categorizer::new(&config.categories, &config.platforms)?;
        let detector = DuplicateDetector::new(config.duplicates.clone())?;
        let store = RegisterStore::new(&config.register.path, config.register.high_value_threshold, detector);
        Ok(Self::new(Box::new(DefaultNormalizer::new(categorizer)), store))
    }

    pub fn register_path(&self) -> &Path {
        self.store.path()
    }

    /// Ingest a file. The declared format falls back to the file extension;
    /// the content signature is checked against either.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn ingest_file(&self, path: &Path, declared: Option<SourceFormat>) -> Result<PipelineResult> {
        let declared = declared.or_else(|| SourceFormat::from_path(path));
        let bytes = fs::read(path)?;
        self.ingest_bytes(&bytes, declared, &path.display().to_string())
    }

    #[instrument(skip(self, bytes), fields(bytes_len = bytes.len()))]
    pub fn ingest_bytes(&self, bytes: &[u8], declared: Option<SourceFormat>, label: &str) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let outcome = parse_input(bytes, declared, label).and_then(|(format, parsed)| {
            info!("{}: parsed {} records as {}", label, parsed.records.len(), format);
            self.apply(Some(format), parsed.records, parsed.skipped)
        });
        Self::finish("ingest", start_time, outcome)
    }

    /// Register a single form submission. A missing id is derived from the
    /// submitted fields.
    #[instrument(skip(self, record))]
    pub fn submit_form(&self, mut record: RawRecord) -> Result<PipelineResult> {
        let start_time = Instant::now();
        if !record.is_identifiable() {
            return Self::finish(
                "submit",
                start_time,
                Err(RegisterError::NoRecords("form submission without a name, mobile or email".to_string())),
            );
        }
        record.ensure_id(FORM_ID_PREFIX, None);
        let outcome = self.apply(None, vec![record], 0);
        Self::finish("submit", start_time, outcome)
    }

    /// Reload the register and rewrite every derived sheet.
    #[instrument(skip(self))]
    pub fn rebuild(&self) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let outcome = self.apply(None, Vec::new(), 0);
        Self::finish("rebuild", start_time, outcome)
    }

    fn apply(&self, format: Option<SourceFormat>, raw: Vec<RawRecord>, skipped: usize) -> Result<PipelineResult> {
        let run_id = Uuid::new_v4();
        let normalized = normalize_all(self.normalizer.as_ref(), &raw);

        let mut register: Register = self.store.load()?;
        let before = register.len();
        let merge = register.merge(&normalized);
        info!(
            "Run {}: {} new, {} known ids ({} status updates), register {} -> {}",
            run_id,
            merge.added,
            merge.duplicate_ids,
            merge.status_updates,
            before,
            register.len()
        );

        let saved = self.store.save(&register)?;
        Ok(PipelineResult::new(run_id, format, raw.len(), skipped, &normalized, merge, saved))
    }

    fn finish(kind: &str, start_time: Instant, outcome: Result<PipelineResult>) -> Result<PipelineResult> {
        metrics::pipeline::duration(kind, start_time.elapsed().as_secs_f64());
        match &outcome {
            Ok(result) => {
                metrics::pipeline::run_success(kind);
                metrics::pipeline::records_added(result.added as u64);
            }
            Err(e) => {
                metrics::pipeline::run_error(kind);
                warn!("{} failed: {}", kind, e);
            }
        }
        outcome
    }
}
