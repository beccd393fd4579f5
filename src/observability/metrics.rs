//! Metrics for the complaint pipeline
//!
//! Recording goes through the `metrics` facade, so every function here is a
//! cheap no-op until a recorder is installed with [`init`].

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

/// Every metric name used in the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Parser metrics
    ParserParseSuccess,
    ParserParseError,
    ParserDuration,
    ParserRecordsExtracted,
    ParserRecordsSkipped,
    ParserBytesProcessed,

    // Normalize metrics
    NormalizeRecordsProcessed,
    NormalizeWarnings,
    NormalizeDuration,

    // Duplicate detection metrics
    DuplicatesPairsCompared,
    DuplicatesGroupsFound,
    DuplicatesDuration,

    // Register metrics
    RegisterLoadError,
    RegisterSaveSuccess,
    RegisterBytesWritten,
    RegisterRecords,
    RegisterSaveDuration,

    // Pipeline run metrics
    PipelineRunSuccess,
    PipelineRunError,
    PipelineRecordsAdded,
    PipelineDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ParserParseSuccess => "complaint_register_parser_parse_success_total",
            MetricName::ParserParseError => "complaint_register_parser_parse_error_total",
            MetricName::ParserDuration => "complaint_register_parser_duration_seconds",
            MetricName::ParserRecordsExtracted => "complaint_register_parser_records_extracted_total",
            MetricName::ParserRecordsSkipped => "complaint_register_parser_records_skipped_total",
            MetricName::ParserBytesProcessed => "complaint_register_parser_bytes_processed",

            MetricName::NormalizeRecordsProcessed => "complaint_register_normalize_records_processed_total",
            MetricName::NormalizeWarnings => "complaint_register_normalize_warnings_total",
            MetricName::NormalizeDuration => "complaint_register_normalize_duration_seconds",

            MetricName::DuplicatesPairsCompared => "complaint_register_duplicates_pairs_compared_total",
            MetricName::DuplicatesGroupsFound => "complaint_register_duplicates_groups_found",
            MetricName::DuplicatesDuration => "complaint_register_duplicates_duration_seconds",

            MetricName::RegisterLoadError => "complaint_register_register_load_error_total",
            MetricName::RegisterSaveSuccess => "complaint_register_register_save_success_total",
            MetricName::RegisterBytesWritten => "complaint_register_register_bytes_written",
            MetricName::RegisterRecords => "complaint_register_register_records",
            MetricName::RegisterSaveDuration => "complaint_register_register_save_duration_seconds",

            MetricName::PipelineRunSuccess => "complaint_register_pipeline_run_success_total",
            MetricName::PipelineRunError => "complaint_register_pipeline_run_error_total",
            MetricName::PipelineRecordsAdded => "complaint_register_pipeline_records_added_total",
            MetricName::PipelineDuration => "complaint_register_pipeline_duration_seconds",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            ParserParseSuccess,
            ParserParseError,
            ParserDuration,
            ParserRecordsExtracted,
            ParserRecordsSkipped,
            ParserBytesProcessed,
            NormalizeRecordsProcessed,
            NormalizeWarnings,
            NormalizeDuration,
            DuplicatesPairsCompared,
            DuplicatesGroupsFound,
            DuplicatesDuration,
            RegisterLoadError,
            RegisterSaveSuccess,
            RegisterBytesWritten,
            RegisterRecords,
            RegisterSaveDuration,
            PipelineRunSuccess,
            PipelineRunError,
            PipelineRecordsAdded,
            PipelineDuration,
        ]
        .into_iter()
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it again is a no-op.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Current snapshot in Prometheus text format, if a recorder is installed
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

/// Write the current snapshot to `path`.
pub fn write_snapshot(path: &Path) -> std::io::Result<bool> {
    match render() {
        Some(text) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, text)?;
            info!("Wrote metrics snapshot to {}", path.display());
            Ok(true)
        }
        None => Ok(false),
    }
}

// ============================================================================
// Parser Metrics
// ============================================================================

pub mod parser {
    use super::MetricName;

    pub fn parse_success(format: &str) {
        ::metrics::counter!(MetricName::ParserParseSuccess.as_str(), "format" => format.to_string()).increment(1);
    }

    pub fn parse_error(format: &str) {
        ::metrics::counter!(MetricName::ParserParseError.as_str(), "format" => format.to_string()).increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::ParserDuration.as_str()).record(secs);
    }

    pub fn records_extracted(count: u64) {
        ::metrics::counter!(MetricName::ParserRecordsExtracted.as_str()).increment(count);
    }

    /// Entries dropped for lacking a name or contact
    pub fn records_skipped(count: u64) {
        ::metrics::counter!(MetricName::ParserRecordsSkipped.as_str()).increment(count);
    }

    pub fn bytes_processed(bytes: usize) {
        ::metrics::histogram!(MetricName::ParserBytesProcessed.as_str()).record(bytes as f64);
    }
}

// ============================================================================
// Normalize Metrics
// ============================================================================

pub mod normalize {
    use super::MetricName;

    pub fn records_processed(count: u64) {
        ::metrics::counter!(MetricName::NormalizeRecordsProcessed.as_str()).increment(count);
    }

    pub fn warnings(count: u64) {
        ::metrics::counter!(MetricName::NormalizeWarnings.as_str()).increment(count);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::NormalizeDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Duplicate Detection Metrics
// ============================================================================

pub mod duplicates {
    use super::MetricName;

    pub fn pairs_compared(count: u64) {
        ::metrics::counter!(MetricName::DuplicatesPairsCompared.as_str()).increment(count);
    }

    /// Groups found by the latest scan
    pub fn groups_found(count: u64) {
        ::metrics::gauge!(MetricName::DuplicatesGroupsFound.as_str()).set(count as f64);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::DuplicatesDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Register Metrics
// ============================================================================

pub mod register {
    use super::MetricName;

    pub fn load_error() {
        ::metrics::counter!(MetricName::RegisterLoadError.as_str()).increment(1);
    }

    pub fn save_success() {
        ::metrics::counter!(MetricName::RegisterSaveSuccess.as_str()).increment(1);
    }

    pub fn bytes_written(bytes: usize) {
        ::metrics::histogram!(MetricName::RegisterBytesWritten.as_str()).record(bytes as f64);
    }

    /// Records held by the register after the latest save
    pub fn records_total(count: usize) {
        ::metrics::gauge!(MetricName::RegisterRecords.as_str()).set(count as f64);
    }

    pub fn save_duration(secs: f64) {
        ::metrics::histogram!(MetricName::RegisterSaveDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Pipeline Metrics
// ============================================================================

pub mod pipeline {
    use super::MetricName;

    pub fn run_success(kind: &str) {
        ::metrics::counter!(MetricName::PipelineRunSuccess.as_str(), "kind" => kind.to_string()).increment(1);
    }

    pub fn run_error(kind: &str) {
        ::metrics::counter!(MetricName::PipelineRunError.as_str(), "kind" => kind.to_string()).increment(1);
    }

    pub fn records_added(count: u64) {
        ::metrics::counter!(MetricName::PipelineRecordsAdded.as_str()).increment(count);
    }

    pub fn duration(kind: &str, secs: f64) {
        ::metrics::histogram!(MetricName::PipelineDuration.as_str(), "kind" => kind.to_string()).record(secs);
    }
}
