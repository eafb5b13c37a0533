//! Pipeline counters, exposed in Prometheus text format.
//!
//! Recording is a no-op until [`init`] installs the recorder, so library code
//! and tests can call these freely.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

use crate::error::Result;
use crate::pipeline::storage::write_text_atomic;

/// Every metric the pipeline records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Fetch
    FetchRequestsSuccess,
    FetchRequestsError,
    FetchRetries,
    FetchRequestDuration,
    FetchPayloadBytes,

    // Refine
    RefineRecordsRefined,
    RefineRecordsFailed,
    RefineRecordsInvalid,
    RefineFieldsRefined,
    RefineIssuesFound,

    // Enrich
    EnrichFieldsSeen,
    EnrichFieldsCategorized,

    // Years
    YearsExtracted,

    // Catalog
    CatalogRecordsObserved,
    CatalogFieldsCatalogued,

    // Export
    ExportRowsWritten,
    ExportRecordsExported,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::FetchRequestsSuccess => "factbook_fetch_requests_success_total",
            MetricName::FetchRequestsError => "factbook_fetch_requests_error_total",
            MetricName::FetchRetries => "factbook_fetch_retries_total",
            MetricName::FetchRequestDuration => "factbook_fetch_request_duration_seconds",
            MetricName::FetchPayloadBytes => "factbook_fetch_payload_bytes",

            MetricName::RefineRecordsRefined => "factbook_refine_records_refined_total",
            MetricName::RefineRecordsFailed => "factbook_refine_records_failed_total",
            MetricName::RefineRecordsInvalid => "factbook_refine_records_invalid_total",
            MetricName::RefineFieldsRefined => "factbook_refine_fields_refined_total",
            MetricName::RefineIssuesFound => "factbook_refine_issues_found_total",

            MetricName::EnrichFieldsSeen => "factbook_enrich_fields_seen_total",
            MetricName::EnrichFieldsCategorized => "factbook_enrich_fields_categorized_total",

            MetricName::YearsExtracted => "factbook_years_extracted_total",

            MetricName::CatalogRecordsObserved => "factbook_catalog_records_observed_total",
            MetricName::CatalogFieldsCatalogued => "factbook_catalog_fields_catalogued_total",

            MetricName::ExportRowsWritten => "factbook_export_rows_written_total",
            MetricName::ExportRecordsExported => "factbook_export_records_exported_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            FetchRequestsSuccess,
            FetchRequestsError,
            FetchRetries,
            FetchRequestDuration,
            FetchPayloadBytes,
            RefineRecordsRefined,
            RefineRecordsFailed,
            RefineRecordsInvalid,
            RefineFieldsRefined,
            RefineIssuesFound,
            EnrichFieldsSeen,
            EnrichFieldsCategorized,
            YearsExtracted,
            CatalogRecordsObserved,
            CatalogFieldsCatalogued,
            ExportRowsWritten,
            ExportRecordsExported,
        ]
        .into_iter()
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once.
pub fn init() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
            info!("Metrics recorder installed");
        }
        Err(e) => warn!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// Current metrics in Prometheus exposition format, if the recorder is installed
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

/// Write the rendered metrics to `path` at the end of a run.
pub fn write_to(path: &Path) -> Result<()> {
    match render() {
        Some(text) => {
            write_text_atomic(path, &text)?;
            info!(path = %path.display(), "Wrote metrics");
        }
        None => warn!("Metrics recorder not installed; nothing written"),
    }
    Ok(())
}

fn count(name: MetricName, n: usize) {
    if n > 0 {
        ::metrics::counter!(name.as_str()).increment(n as u64);
    }
}

// ============================================================================
// Fetch Metrics
// ============================================================================

pub mod fetch {
    use super::{count, MetricName};

    pub fn request_success() {
        count(MetricName::FetchRequestsSuccess, 1);
    }

    pub fn request_error() {
        count(MetricName::FetchRequestsError, 1);
    }

    pub fn retry() {
        count(MetricName::FetchRetries, 1);
    }

    pub fn request_duration(secs: f64) {
        ::metrics::histogram!(MetricName::FetchRequestDuration.as_str()).record(secs);
    }

    pub fn payload_bytes(bytes: usize) {
        ::metrics::histogram!(MetricName::FetchPayloadBytes.as_str()).record(bytes as f64);
    }
}

// ============================================================================
// Refine Metrics
// ============================================================================

pub mod refine {
    use super::{count, MetricName};

    pub fn record_refined() {
        count(MetricName::RefineRecordsRefined, 1);
    }

    pub fn record_failed() {
        count(MetricName::RefineRecordsFailed, 1);
    }

    /// Written, but with structural violations
    pub fn record_invalid() {
        count(MetricName::RefineRecordsInvalid, 1);
    }

    pub fn fields_refined(n: usize) {
        count(MetricName::RefineFieldsRefined, n);
    }

    pub fn issues_found(n: usize) {
        count(MetricName::RefineIssuesFound, n);
    }
}

// ============================================================================
// Enrich Metrics
// ============================================================================

pub mod enrich {
    use super::{count, MetricName};

    pub fn fields_enriched(seen: usize, categorized: usize) {
        count(MetricName::EnrichFieldsSeen, seen);
        count(MetricName::EnrichFieldsCategorized, categorized);
    }
}

pub mod years {
    use super::{count, MetricName};

    pub fn years_extracted(n: usize) {
        count(MetricName::YearsExtracted, n);
    }
}

// ============================================================================
// Catalog Metrics
// ============================================================================

pub mod catalog {
    use super::{count, MetricName};

    pub fn records_observed(n: usize) {
        count(MetricName::CatalogRecordsObserved, n);
    }

    pub fn fields_catalogued(n: usize) {
        count(MetricName::CatalogFieldsCatalogued, n);
    }
}

// ============================================================================
// Export Metrics
// ============================================================================

pub mod export {
    use super::{count, MetricName};

    pub fn rows_written(n: usize) {
        count(MetricName::ExportRowsWritten, n);
    }

    pub fn record_exported() {
        count(MetricName::ExportRecordsExported, 1);
    }
}
