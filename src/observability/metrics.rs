//! Metrics for the inspection service.
//!
//! Recording goes through the `metrics` facade; when no recorder is
//! installed (tests, CLI commands) every call is a no-op.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use tracing::info;

use crate::error::{AppError, Result};

/// Every metric the service records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Reports
    ReportsCreated,
    ReportsSubmitted,
    ReportsFinalised,
    ReportTransitions,
    ValidationFailures,

    // Photos
    PhotosUploaded,
    PhotoBytes,

    // PDF
    PdfsRendered,
    PdfRenderDuration,

    // Sync
    SyncOutcomes,

    // Complaints
    ComplaintsSubmitted,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ReportsCreated => "roof_inspect_reports_created_total",
            MetricName::ReportsSubmitted => "roof_inspect_reports_submitted_total",
            MetricName::ReportsFinalised => "roof_inspect_reports_finalised_total",
            MetricName::ReportTransitions => "roof_inspect_report_transitions_total",
            MetricName::ValidationFailures => "roof_inspect_validation_failures_total",
            MetricName::PhotosUploaded => "roof_inspect_photos_uploaded_total",
            MetricName::PhotoBytes => "roof_inspect_photo_bytes",
            MetricName::PdfsRendered => "roof_inspect_pdfs_rendered_total",
            MetricName::PdfRenderDuration => "roof_inspect_pdf_render_duration_seconds",
            MetricName::SyncOutcomes => "roof_inspect_sync_outcomes_total",
            MetricName::ComplaintsSubmitted => "roof_inspect_complaints_submitted_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            ReportsCreated,
            ReportsSubmitted,
            ReportsFinalised,
            ReportTransitions,
            ValidationFailures,
            PhotosUploaded,
            PhotoBytes,
            PdfsRendered,
            PdfRenderDuration,
            SyncOutcomes,
            ComplaintsSubmitted,
        ]
        .into_iter()
    }

    /// Help text registered with the exporter
    pub fn description(&self) -> &'static str {
        match self {
            MetricName::ReportsCreated => "Reports created through the API or sync",
            MetricName::ReportsSubmitted => "Reports submitted for review",
            MetricName::ReportsFinalised => "Reports finalised",
            MetricName::ReportTransitions => "Report status transitions by target status",
            MetricName::ValidationFailures => "Submissions rejected by the completion check",
            MetricName::PhotosUploaded => "Photos uploaded",
            MetricName::PhotoBytes => "Uploaded photo size in bytes",
            MetricName::PdfsRendered => "PDF documents rendered by kind",
            MetricName::PdfRenderDuration => "PDF render time in seconds",
            MetricName::SyncOutcomes => "Mobile sync results by outcome",
            MetricName::ComplaintsSubmitted => "LBP complaints submitted",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Installs the global Prometheus recorder and returns the handle that
/// renders `/metrics`.
pub fn init() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Config(format!("Failed to install Prometheus recorder: {}", e)))?;
    for metric in MetricName::all_metrics() {
        match metric {
            MetricName::PhotoBytes | MetricName::PdfRenderDuration => {
                ::metrics::describe_histogram!(metric.as_str(), metric.description())
            }
            _ => ::metrics::describe_counter!(metric.as_str(), metric.description()),
        }
    }
    info!("Metrics recorder installed");
    Ok(handle)
}

// ============================================================================
// Reports
// ============================================================================

pub mod reports {
    use super::MetricName;

    pub fn created() {
        ::metrics::counter!(MetricName::ReportsCreated.as_str()).increment(1);
    }

    pub fn transitioned(to: &'static str) {
        ::metrics::counter!(MetricName::ReportTransitions.as_str(), "to" => to).increment(1);
        match to {
            "PENDING_REVIEW" => ::metrics::counter!(MetricName::ReportsSubmitted.as_str()).increment(1),
            "FINALISED" => ::metrics::counter!(MetricName::ReportsFinalised.as_str()).increment(1),
            _ => {}
        }
    }

    pub fn validation_failed() {
        ::metrics::counter!(MetricName::ValidationFailures.as_str()).increment(1);
    }
}

// ============================================================================
// Photos
// ============================================================================

pub mod photos {
    use super::MetricName;

    pub fn uploaded(bytes: usize) {
        ::metrics::counter!(MetricName::PhotosUploaded.as_str()).increment(1);
        ::metrics::histogram!(MetricName::PhotoBytes.as_str()).record(bytes as f64);
    }
}

// ============================================================================
// PDF
// ============================================================================

pub mod pdf {
    use super::MetricName;

    pub fn rendered(kind: &'static str, secs: f64) {
        ::metrics::counter!(MetricName::PdfsRendered.as_str(), "kind" => kind).increment(1);
        ::metrics::histogram!(MetricName::PdfRenderDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Sync and complaints
// ============================================================================

pub mod sync {
    use super::MetricName;

    pub fn outcome(outcome: &'static str) {
        ::metrics::counter!(MetricName::SyncOutcomes.as_str(), "outcome" => outcome).increment(1);
    }
}

pub mod complaints {
    use super::MetricName;

    pub fn submitted() {
        ::metrics::counter!(MetricName::ComplaintsSubmitted.as_str()).increment(1);
    }
}
