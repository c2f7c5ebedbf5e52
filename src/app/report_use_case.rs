use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::lifecycle::{self, Precondition};
use super::ports::PhotoStore;
use super::validation::{validate_report, ValidationReport};
use super::{load_report, touch_report};
use crate::constants::{report_number, MAX_SIGNATURE_BYTES};
use crate::domain::*;
use crate::domain::{apply_text, is_blank};
use crate::error::{AppError, Result};
use crate::observability::metrics;
use crate::storage::{load_bundle, Storage};

/// Attempts at claiming a report number before giving up on a race.
pub(crate) const NUMBER_ATTEMPTS: usize = 3;

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const PNG_DATA_URL: &str = "data:image/png;base64,";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInput {
    /// `data:image/png;base64,...` or bare base64
    pub signature: String,
    #[serde(default)]
    pub declaration_accepted: bool,
}

/// Reports and their lifecycle.
pub struct ReportUseCase {
    storage: Arc<dyn Storage>,
    photos: Arc<dyn PhotoStore>,
}

impl ReportUseCase {
    pub fn new(storage: Arc<dyn Storage>, photos: Arc<dyn PhotoStore>) -> Self {
        Self { storage, photos }
    }

    pub async fn create(&self, acting: &User, input: NewReport) -> Result<Report> {
        if input.property_address.trim().is_empty() {
            return Err(AppError::invalid("propertyAddress", "must not be blank"));
        }
        if input.client_name.trim().is_empty() {
            return Err(AppError::invalid("clientName", "must not be blank"));
        }
        if let Some(id) = input.id {
            if self.storage.get_report(id).await?.is_some() {
                return Err(AppError::Conflict(format!("report {id} already exists")));
            }
        }

        let year = Utc::now().year();
        let mut last_error = None;
        for _ in 0..NUMBER_ATTEMPTS {
            let sequence = self.storage.next_report_sequence(year).await?;
            let report = Report::new(acting.id, report_number(year, sequence), input.clone());
            match self.storage.create_report(&report).await {
                Ok(()) => {
                    metrics::reports::created();
                    info!("Created report {} for {}", report.report_number, acting.email);
                    return Ok(report);
                }
                Err(AppError::Conflict(msg)) => {
                    warn!("Report number race, retrying: {}", msg);
                    last_error = Some(AppError::Conflict(msg));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| AppError::Conflict("could not allocate a report number".into())))
    }

    pub async fn get_bundle(&self, acting: &User, id: Uuid) -> Result<ReportBundle> {
        let report = load_report(self.storage.as_ref(), id).await?;
        lifecycle::ensure_can_read(acting, &report)?;
        load_bundle(self.storage.as_ref(), report).await
    }

    /// Inspectors only ever see their own reports.
    pub async fn list(&self, acting: &User, mut filter: ReportFilter) -> Result<Vec<Report>> {
        filter.inspector_id = if acting.can_review() {
            None
        } else {
            Some(acting.id)
        };
        self.storage.list_reports(&filter).await
    }

    pub async fn update(&self, acting: &User, id: Uuid, update: ReportUpdate) -> Result<Report> {
        let mut report = load_report(self.storage.as_ref(), id).await?;
        lifecycle::ensure_can_edit(acting, &report)?;
        if update.property_address.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(AppError::invalid("propertyAddress", "must not be blank"));
        }
        if update.client_name.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(AppError::invalid("clientName", "must not be blank"));
        }
        update.apply(&mut report);
        touch_report(self.storage.as_ref(), &mut report).await?;
        Ok(report)
    }

    pub async fn delete(&self, acting: &User, id: Uuid) -> Result<()> {
        let report = load_report(self.storage.as_ref(), id).await?;
        lifecycle::ensure_can_edit(acting, &report)?;
        self.storage.delete_report(id).await?;
        info!("Deleted report {}", report.report_number);
        Ok(())
    }

    pub async fn validate(&self, acting: &User, id: Uuid) -> Result<ValidationReport> {
        let bundle = self.get_bundle(acting, id).await?;
        Ok(validate_report(&bundle, Utc::now().date_naive()))
    }

    pub async fn transition(&self, acting: &User, id: Uuid, to: ReportStatus) -> Result<Report> {
        let mut report = load_report(self.storage.as_ref(), id).await?;
        match lifecycle::check_transition(acting, &report, to)? {
            Precondition::None => {}
            Precondition::Validated => {
                let bundle = load_bundle(self.storage.as_ref(), report.clone()).await?;
                let check = validate_report(&bundle, Utc::now().date_naive());
                if !check.valid {
                    metrics::reports::validation_failed();
                    return Err(AppError::Validation {
                        issues: check.errors().cloned().collect(),
                    });
                }
            }
            Precondition::Signed => {
                if !report.is_signed() {
                    return Err(AppError::invalid(
                        "signature",
                        "the report must be signed before it is finalised",
                    ));
                }
            }
        }

        let from = report.status;
        let now = utc_now();
        match to {
            ReportStatus::PendingReview => report.submitted_at = Some(now),
            ReportStatus::Approved => report.approved_at = Some(now),
            ReportStatus::Finalised => report.finalised_at = Some(now),
            _ => {}
        }
        report.status = to;
        report.updated_at = now;
        self.storage.update_report(&report).await?;

        metrics::reports::transitioned(to.as_str());
        info!(
            "Report {} moved from {} to {} by {}",
            report.report_number, from, to, acting.email
        );
        Ok(report)
    }

    pub async fn submit(&self, acting: &User, id: Uuid) -> Result<Report> {
        self.transition(acting, id, ReportStatus::PendingReview).await
    }

    pub async fn sign(&self, acting: &User, id: Uuid, input: SignatureInput) -> Result<Report> {
        let mut report = load_report(self.storage.as_ref(), id).await?;
        lifecycle::ensure_can_edit(acting, &report)?;
        if !input.declaration_accepted {
            return Err(AppError::invalid(
                "declarationAccepted",
                "the inspector declaration must be accepted",
            ));
        }

        let bytes = decode_signature(&input.signature)?;
        let signature_ref = self.photos.put(&bytes, "image/png").await?;

        report.signature_ref = Some(signature_ref);
        report.declaration_signed = true;
        report.signed_at = Some(utc_now());
        touch_report(self.storage.as_ref(), &mut report).await?;
        info!("Report {} signed by {}", report.report_number, acting.email);
        Ok(report)
    }

    pub async fn get_compliance(
        &self,
        acting: &User,
        id: Uuid,
    ) -> Result<Option<ComplianceAssessment>> {
        let report = load_report(self.storage.as_ref(), id).await?;
        lifecycle::ensure_can_read(acting, &report)?;
        self.storage.get_compliance(id).await
    }

    /// Replaces the report's assessment.
    pub async fn put_compliance(
        &self,
        acting: &User,
        id: Uuid,
        input: ComplianceInput,
    ) -> Result<ComplianceAssessment> {
        let mut report = load_report(self.storage.as_ref(), id).await?;
        lifecycle::ensure_can_edit(acting, &report)?;
        check_compliance_items(&input.items)?;

        let now = utc_now();
        let existing = self.storage.get_compliance(id).await?;
        let mut assessment = ComplianceAssessment {
            id: existing.as_ref().map_or_else(Uuid::new_v4, |e| e.id),
            report_id: id,
            items: input.items,
            overall_notes: None,
            assessed_at: existing.as_ref().map_or(now, |e| e.assessed_at),
            updated_at: now,
        };
        apply_text(&mut assessment.overall_notes, input.overall_notes);
        report.status = lifecycle::status_after_edit(report.status);
        report.updated_at = now;
        self.storage.put_compliance(&report, &assessment).await?;
        Ok(assessment)
    }

    /// Renders the report PDF, returning its report number for the file name.
    pub async fn pdf(&self, acting: &User, id: Uuid) -> Result<(String, Vec<u8>)> {
        let bundle = self.get_bundle(acting, id).await?;
        let inspector = self
            .storage
            .get_user(bundle.report.inspector_id)
            .await?
            .ok_or_else(|| AppError::not_found("user", bundle.report.inspector_id))?;
        let bytes = crate::pdf::render_report(&bundle, &inspector)?;
        Ok((bundle.report.report_number, bytes))
    }
}

pub(crate) fn check_compliance_items(items: &[ComplianceItem]) -> Result<()> {
    let mut seen = HashSet::new();
    for (i, item) in items.iter().enumerate() {
        if !seen.insert(item.clause) {
            return Err(AppError::invalid(
                &format!("items[{i}].clause"),
                format!("clause {} is assessed more than once", item.clause),
            ));
        }
        if item.status == ComplianceStatus::NonCompliant && is_blank(&item.notes) {
            return Err(AppError::invalid(
                &format!("items[{i}].notes"),
                format!("notes are required for non-compliant clause {}", item.clause),
            ));
        }
    }
    Ok(())
}

fn decode_signature(raw: &str) -> Result<Vec<u8>> {
    let raw = raw.trim();
    let encoded = match raw.strip_prefix(PNG_DATA_URL) {
        Some(rest) => rest,
        None if raw.starts_with("data:") => {
            return Err(AppError::invalid("signature", "signature must be a PNG image"))
        }
        None => raw,
    };
    if encoded.len() > MAX_SIGNATURE_BYTES * 4 / 3 + 4 {
        return Err(AppError::PayloadTooLarge {
            size: encoded.len() * 3 / 4,
            limit: MAX_SIGNATURE_BYTES,
        });
    }
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| AppError::invalid("signature", "signature is not valid base64"))?;
    if bytes.len() > MAX_SIGNATURE_BYTES {
        return Err(AppError::PayloadTooLarge {
            size: bytes.len(),
            limit: MAX_SIGNATURE_BYTES,
        });
    }
    if !bytes.starts_with(PNG_MAGIC) {
        return Err(AppError::invalid("signature", "signature must be a PNG image"));
    }
    Ok(bytes)
}
