//! Offline mobile sync with last-write-wins conflict detection.
//!
//! The device owns report content while it is offline; the server owns
//! everything that drives the workflow (status, numbering, ownership,
//! signatures). An upload only wins when the server copy has not moved on
//! since the device last saw it.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::lifecycle::status_after_edit;
use super::report_items_use_case::{check_defect, check_element};
use super::report_use_case::{check_compliance_items, NUMBER_ATTEMPTS};
use super::validation::ValidationIssue;
use crate::constants::report_number;
use crate::domain::*;
use crate::domain::apply_text;
use crate::error::{AppError, Result};
use crate::observability::metrics;
use crate::storage::{load_bundle, Storage};

static UPLOAD_SCHEMA: Lazy<JSONSchema> = Lazy::new(|| {
    let schema: Value = serde_json::from_str(include_str!("../../schemas/sync_upload.v1.json"))
        .expect("sync upload schema is valid JSON");
    // jsonschema 0.17 ties compile errors to the schema lifetime
    let schema: &'static Value = Box::leak(Box::new(schema));
    JSONSchema::options()
        .compile(schema)
        .expect("sync upload schema compiles")
});

static REPORT_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^RPT-(\d{4})-(\d{4})$").expect("static regex should not panic"));

/// Keeps a device-issued report number only when it is well formed, was
/// issued for `year` and does not run ahead of the server's sequence.
pub fn accepted_report_number(requested: Option<&str>, year: i32, next_sequence: u32) -> Option<String> {
    let number = requested?.trim();
    let caps = REPORT_NUMBER.captures(number)?;
    let issued_year: i32 = caps[1].parse().ok()?;
    let sequence: u32 = caps[2].parse().ok()?;
    (issued_year == year && sequence >= 1 && sequence <= next_sequence).then(|| number.to_string())
}

/// Checks an upload body against `schemas/sync_upload.v1.json`.
pub fn check_upload_schema(body: &Value) -> Result<()> {
    UPLOAD_SCHEMA.validate(body).map_err(|errors| AppError::Validation {
        issues: errors
            .map(|e| {
                let path = e.instance_path.to_string();
                let field = if path.is_empty() { "body".to_string() } else { path };
                ValidationIssue::error(field, e.to_string())
            })
            .collect(),
    })
}

/// A report as edited on the device. Server-controlled fields the device
/// may echo back (status, owner, signature, timestamps) are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientReport {
    pub id: Uuid,
    pub report_number: Option<String>,
    pub property_address: String,
    pub property_city: Option<String>,
    pub property_region: Option<String>,
    pub property_type: Option<PropertyType>,
    pub building_age: Option<i32>,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub inspection_date: Option<NaiveDate>,
    pub inspection_type: Option<InspectionType>,
    pub weather_conditions: Option<String>,
    pub access_method: Option<String>,
    pub limitations: Option<String>,
    pub scope_of_works: Option<String>,
    pub executive_summary: Option<String>,
    pub conclusions: Option<String>,
    pub recommendations: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ClientReport {
    /// Replaces every content field of `report` with the device's copy.
    fn copy_into(&self, report: &mut Report) {
        let text = |v: &Option<String>| Some(v.clone().unwrap_or_default());
        ReportUpdate {
            property_address: Some(self.property_address.clone()),
            property_city: text(&self.property_city),
            property_region: text(&self.property_region),
            property_type: None,
            building_age: None,
            client_name: Some(self.client_name.clone()),
            client_email: text(&self.client_email),
            client_phone: text(&self.client_phone),
            inspection_date: None,
            inspection_type: None,
            weather_conditions: text(&self.weather_conditions),
            access_method: text(&self.access_method),
            limitations: text(&self.limitations),
            scope_of_works: text(&self.scope_of_works),
            executive_summary: text(&self.executive_summary),
            conclusions: text(&self.conclusions),
            recommendations: text(&self.recommendations),
        }
        .apply(report);
        // Patches cannot clear these, a full copy can
        report.property_type = self.property_type;
        report.building_age = self.building_age;
        report.inspection_date = self.inspection_date;
        report.inspection_type = self.inspection_type;
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBundle {
    pub report: ClientReport,
    #[serde(default)]
    pub roof_elements: Vec<NewRoofElement>,
    #[serde(default)]
    pub defects: Vec<NewDefect>,
    pub compliance_assessment: Option<ComplianceInput>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUpload {
    pub device_id: String,
    pub reports: Vec<SyncBundle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOutcome {
    Created,
    Updated,
    Conflict,
    Rejected,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Created => "CREATED",
            SyncOutcome::Updated => "UPDATED",
            SyncOutcome::Conflict => "CONFLICT",
            SyncOutcome::Rejected => "REJECTED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub report_id: Uuid,
    pub outcome: SyncOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Server copy the device should adopt after a conflict
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ReportBundle>,
    /// Server `updatedAt` of the accepted copy; the device keeps it as its
    /// base for the next upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SyncResult {
    fn new(report_id: Uuid, outcome: SyncOutcome) -> Self {
        Self {
            report_id,
            outcome,
            message: None,
            server: None,
            updated_at: None,
        }
    }

    fn accepted(report: &Report, outcome: SyncOutcome) -> Self {
        Self {
            updated_at: Some(report.updated_at),
            ..Self::new(report.id, outcome)
        }
    }

    fn rejected(report_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(report_id, SyncOutcome::Rejected)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub server_time: DateTime<Utc>,
    pub results: Vec<SyncResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPull {
    pub server_time: DateTime<Utc>,
    pub reports: Vec<ReportBundle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Create,
    Update,
    Conflict(&'static str),
    Reject(&'static str),
}

/// Last-write-wins: the device copy is accepted unless the server copy is
/// finalised or was changed after the device's last edit.
pub fn decide(acting: &User, server: Option<&Report>, client_updated_at: DateTime<Utc>) -> Decision {
    match server {
        None => Decision::Create,
        Some(s) if s.inspector_id != acting.id && !acting.is_admin() => {
            Decision::Reject("report belongs to another inspector")
        }
        Some(s) if s.status == ReportStatus::Finalised => {
            Decision::Conflict("report is finalised on the server")
        }
        Some(s) if s.updated_at > client_updated_at => {
            Decision::Conflict("server copy changed after the device copy")
        }
        Some(_) => Decision::Update,
    }
}

pub struct SyncUseCase {
    storage: Arc<dyn Storage>,
}

impl SyncUseCase {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn upload(&self, acting: &User, body: Value) -> Result<SyncResponse> {
        check_upload_schema(&body)?;
        let upload: SyncUpload = serde_json::from_value(body)?;
        let now = utc_now();
        info!(
            "Sync upload from device {} by {} with {} reports",
            upload.device_id,
            acting.email,
            upload.reports.len()
        );

        let mut results = Vec::with_capacity(upload.reports.len());
        for bundle in upload.reports {
            let report_id = bundle.report.id;
            let result = match self.apply_bundle(acting, bundle, now).await {
                Ok(result) => result,
                Err(e @ (AppError::Validation { .. } | AppError::Conflict(_) | AppError::BadRequest(_))) => {
                    SyncResult::rejected(report_id, e.to_string())
                }
                Err(e) => return Err(e),
            };
            debug!("Sync {} -> {}", report_id, result.outcome.as_str());
            metrics::sync::outcome(result.outcome.as_str());
            results.push(result);
        }
        Ok(SyncResponse {
            server_time: now,
            results,
        })
    }

    /// Every visible report changed after `since`, with its children.
    pub async fn pull(&self, acting: &User, since: Option<DateTime<Utc>>) -> Result<SyncPull> {
        // A write later in the current microsecond would share its stamp;
        // reporting the previous one makes the next pull include it
        let server_time = utc_now() - chrono::Duration::microseconds(1);
        let owner = if acting.can_review() { None } else { Some(acting.id) };
        let mut reports = Vec::new();
        for report in self.storage.reports_updated_since(owner, since).await? {
            reports.push(load_bundle(self.storage.as_ref(), report).await?);
        }
        Ok(SyncPull {
            server_time,
            reports,
        })
    }

    async fn apply_bundle(&self, acting: &User, bundle: SyncBundle, now: DateTime<Utc>) -> Result<SyncResult> {
        let id = bundle.report.id;
        let server = self.storage.get_report(id).await?;
        match (decide(acting, server.as_ref(), bundle.report.updated_at), server) {
            (Decision::Reject(reason), _) => Ok(SyncResult::rejected(id, reason)),
            (Decision::Conflict(reason), Some(server)) => Ok(SyncResult {
                message: Some(reason.to_string()),
                server: Some(load_bundle(self.storage.as_ref(), server).await?),
                ..SyncResult::new(id, SyncOutcome::Conflict)
            }),
            (Decision::Update, Some(server)) => self.update_from_client(server, bundle, now).await,
            _ => self.create_from_client(acting, bundle, now).await,
        }
    }

    /// Child ids already used by a different report.
    async fn foreign_child(&self, report_id: Uuid, bundle: &SyncBundle) -> Result<Option<String>> {
        for id in bundle.roof_elements.iter().filter_map(|e| e.id) {
            if let Some(e) = self.storage.get_roof_element(id).await? {
                if e.report_id != report_id {
                    return Ok(Some(format!("roof element {id} belongs to another report")));
                }
            }
        }
        for id in bundle.defects.iter().filter_map(|d| d.id) {
            if let Some(d) = self.storage.get_defect(id).await? {
                if d.report_id != report_id {
                    return Ok(Some(format!("defect {id} belongs to another report")));
                }
            }
        }
        Ok(None)
    }

    async fn create_from_client(&self, acting: &User, bundle: SyncBundle, now: DateTime<Utc>) -> Result<SyncResult> {
        let client = &bundle.report;
        if let Some(reason) = self.foreign_child(client.id, &bundle).await? {
            return Ok(SyncResult::rejected(client.id, reason));
        }

        let mut report = Report::new(
            acting.id,
            String::new(),
            NewReport {
                id: Some(client.id),
                property_address: client.property_address.clone(),
                client_name: client.client_name.clone(),
                ..Default::default()
            },
        );
        client.copy_into(&mut report);
        report.created_at = client.created_at.map_or(now, |t| t.min(now));
        // Pulls filter on this, so it records when the server took the change
        report.updated_at = now;

        let (elements, defects) = build_children(report.id, &bundle, &[], &[], now)?;
        let compliance = build_compliance(report.id, bundle.compliance_assessment.clone(), None, now)?;

        let year = now.year();
        let next = self.storage.next_report_sequence(year).await?;
        let mut requested = accepted_report_number(client.report_number.as_deref(), year, next);
        if requested.is_none() && client.report_number.is_some() {
            debug!("Ignoring device report number for {}", client.id);
        }
        let mut attempts = 0;
        loop {
            report.report_number = match requested.take() {
                Some(number) => number,
                None => report_number(year, self.storage.next_report_sequence(year).await?),
            };
            match self
                .storage
                .save_report_tree(&report, &elements, &defects, compliance.as_ref())
                .await
            {
                Ok(()) => break,
                Err(AppError::Conflict(msg)) if attempts < NUMBER_ATTEMPTS => {
                    attempts += 1;
                    debug!("Report number {} unavailable: {}", report.report_number, msg);
                }
                Err(e) => return Err(e),
            }
        }

        metrics::reports::created();
        info!("Created report {} from device sync", report.report_number);
        Ok(SyncResult::accepted(&report, SyncOutcome::Created))
    }

    async fn update_from_client(&self, server: Report, bundle: SyncBundle, now: DateTime<Utc>) -> Result<SyncResult> {
        let id = server.id;
        if let Some(reason) = self.foreign_child(id, &bundle).await? {
            return Ok(SyncResult::rejected(id, reason));
        }
        let existing_elements = self.storage.list_roof_elements(id).await?;
        let existing_defects = self.storage.list_defects(id).await?;
        let existing_compliance = self.storage.get_compliance(id).await?;

        let mut report = server;
        bundle.report.copy_into(&mut report);
        report.status = status_after_edit(report.status);
        report.updated_at = now;

        let (elements, defects) = build_children(id, &bundle, &existing_elements, &existing_defects, now)?;
        let compliance = build_compliance(
            id,
            bundle.compliance_assessment.clone(),
            existing_compliance,
            now,
        )?;
        self.storage
            .save_report_tree(&report, &elements, &defects, compliance.as_ref())
            .await?;
        Ok(SyncResult::accepted(&report, SyncOutcome::Updated))
    }
}

/// Turns device children into entities. Existing children keep their
/// creation time and defect number; new defects are numbered after the
/// highest existing one. Links to elements missing from the upload are
/// dropped.
fn build_children(
    report_id: Uuid,
    bundle: &SyncBundle,
    existing_elements: &[RoofElement],
    existing_defects: &[Defect],
    now: DateTime<Utc>,
) -> Result<(Vec<RoofElement>, Vec<Defect>)> {
    let mut elements = Vec::with_capacity(bundle.roof_elements.len());
    for input in &bundle.roof_elements {
        let id = input.id.unwrap_or_else(Uuid::new_v4);
        let mut element = RoofElement::new(
            report_id,
            NewRoofElement {
                id: Some(id),
                ..input.clone()
            },
        );
        if let Some(prev) = existing_elements.iter().find(|e| e.id == id) {
            element.created_at = prev.created_at;
        }
        element.updated_at = now;
        check_element(&element)?;
        elements.push(element);
    }

    let mut next_number = existing_defects
        .iter()
        .map(|d| d.defect_number)
        .max()
        .unwrap_or(0)
        + 1;
    let mut defects = Vec::with_capacity(bundle.defects.len());
    for input in &bundle.defects {
        let id = input.id.unwrap_or_else(Uuid::new_v4);
        let mut input = NewDefect {
            id: Some(id),
            ..input.clone()
        };
        if input
            .roof_element_id
            .is_some_and(|eid| !elements.iter().any(|e| e.id == eid))
        {
            input.roof_element_id = None;
        }
        let prev = existing_defects.iter().find(|d| d.id == id);
        let number = match prev {
            Some(p) => p.defect_number,
            None => {
                next_number += 1;
                next_number - 1
            }
        };
        let mut defect = Defect::new(report_id, number, input);
        if let Some(p) = prev {
            defect.created_at = p.created_at;
        }
        defect.updated_at = now;
        check_defect(&defect)?;
        defects.push(defect);
    }
    Ok((elements, defects))
}

fn build_compliance(
    report_id: Uuid,
    input: Option<ComplianceInput>,
    existing: Option<ComplianceAssessment>,
    now: DateTime<Utc>,
) -> Result<Option<ComplianceAssessment>> {
    let Some(input) = input else {
        return Ok(None);
    };
    check_compliance_items(&input.items)?;
    let mut assessment = ComplianceAssessment {
        id: existing.as_ref().map_or_else(Uuid::new_v4, |e| e.id),
        report_id,
        items: input.items,
        overall_notes: None,
        assessed_at: existing.as_ref().map_or(now, |e| e.assessed_at),
        updated_at: now,
    };
    apply_text(&mut assessment.overall_notes, input.overall_notes);
    Ok(Some(assessment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::Fixture;
    use chrono::Duration;
    use serde_json::json;

    fn server_report(owner: &User, status: ReportStatus, updated_at: DateTime<Utc>) -> Report {
        let mut report = Report::new(
            owner.id,
            "RPT-2026-0001".to_string(),
            NewReport {
                property_address: "1 Server Street".to_string(),
                client_name: "Server".to_string(),
                ..Default::default()
            },
        );
        report.status = status;
        report.updated_at = updated_at;
        report
    }

    fn upload(report: Value) -> Value {
        json!({ "deviceId": "tablet-7", "reports": [report] })
    }

    fn client_report(id: Uuid, updated_at: DateTime<Utc>) -> Value {
        json!({
            "report": {
                "id": id,
                "propertyAddress": "5 Device Road",
                "clientName": "Device Client",
                "weatherConditions": "Drizzle",
                "inspectionType": "VISUAL",
                "status": "FINALISED",
                "updatedAt": updated_at,
            },
            "roofElements": [
                { "id": Uuid::new_v4(), "elementType": "RIDGE", "location": "Main ridge" }
            ],
            "defects": [
                {
                    "id": Uuid::new_v4(),
                    "title": "Loose cap",
                    "location": "Ridge",
                    "description": "Cap lifts in wind",
                    "classification": "MINOR_DEFECT",
                    "severity": "LOW"
                }
            ]
        })
    }

    #[tokio::test]
    async fn decisions_follow_last_write_wins() {
        let fx = Fixture::new();
        let owner = fx.user(UserRole::Inspector).await;
        let other = fx.user(UserRole::Inspector).await;
        let admin = fx.user(UserRole::Admin).await;
        let t = Utc::now();
        let report = server_report(&owner, ReportStatus::InProgress, t);

        assert_eq!(decide(&owner, None, t), Decision::Create);
        assert_eq!(decide(&owner, Some(&report), t), Decision::Update);
        assert_eq!(decide(&owner, Some(&report), t + Duration::seconds(5)), Decision::Update);
        assert!(matches!(
            decide(&owner, Some(&report), t - Duration::seconds(5)),
            Decision::Conflict(_)
        ));
        assert!(matches!(decide(&other, Some(&report), t), Decision::Reject(_)));
        assert_eq!(decide(&admin, Some(&report), t), Decision::Update);

        let finalised = server_report(&owner, ReportStatus::Finalised, t);
        assert!(matches!(
            decide(&owner, Some(&finalised), t + Duration::hours(1)),
            Decision::Conflict(_)
        ));
    }

    #[test]
    fn schema_rejects_malformed_uploads() {
        assert!(check_upload_schema(&json!({ "deviceId": "x", "reports": [] })).is_ok());
        let err = check_upload_schema(&json!({ "reports": [{ "report": { "id": "nope" } }] }));
        match err {
            Err(AppError::Validation { issues }) => assert!(!issues.is_empty()),
            other => panic!("expected schema failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_reports_are_created_as_drafts() {
        let fx = Fixture::new();
        let uc = SyncUseCase::new(fx.storage.clone());
        let owner = fx.user(UserRole::Inspector).await;
        let id = Uuid::new_v4();

        let response = uc
            .upload(&owner, upload(client_report(id, Utc::now())))
            .await
            .unwrap();
        assert_eq!(response.results[0].outcome, SyncOutcome::Created);

        let stored = fx.storage.get_report(id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Draft);
        assert_eq!(stored.inspector_id, owner.id);
        assert!(stored.report_number.starts_with("RPT-"));
        assert_eq!(stored.weather_conditions.as_deref(), Some("Drizzle"));
        let defects = fx.storage.list_defects(id).await.unwrap();
        assert_eq!(defects[0].defect_number, 1);
    }

    #[tokio::test]
    async fn newer_device_copies_replace_server_content() {
        let fx = Fixture::new();
        let uc = SyncUseCase::new(fx.storage.clone());
        let owner = fx.user(UserRole::Inspector).await;
        let id = Uuid::new_v4();
        let t0 = Utc::now() - Duration::minutes(10);
        uc.upload(&owner, upload(client_report(id, t0))).await.unwrap();
        let before = fx.storage.get_report(id).await.unwrap().unwrap();
        let old_defect = fx.storage.list_defects(id).await.unwrap().remove(0);

        let mut edited = client_report(id, Utc::now() + Duration::seconds(1));
        edited["report"]["weatherConditions"] = Value::Null;
        edited["defects"] = json!([
            {
                "id": old_defect.id,
                "title": "Loose cap",
                "location": "Ridge",
                "description": "Cap now missing",
                "classification": "MAJOR_DEFECT",
                "severity": "HIGH",
                "recommendation": "Replace cap"
            },
            {
                "id": Uuid::new_v4(),
                "roofElementId": Uuid::new_v4(),
                "title": "Rust",
                "location": "Valley",
                "description": "Surface rust",
                "classification": "MAINTENANCE_ITEM",
                "severity": "LOW"
            }
        ]);
        let response = uc.upload(&owner, upload(edited)).await.unwrap();
        assert_eq!(response.results[0].outcome, SyncOutcome::Updated);

        let after = fx.storage.get_report(id).await.unwrap().unwrap();
        assert_eq!(after.report_number, before.report_number);
        assert_eq!(after.status, ReportStatus::InProgress);
        assert_eq!(after.weather_conditions, None);
        let defects = fx.storage.list_defects(id).await.unwrap();
        assert_eq!(defects.len(), 2);
        assert_eq!(defects[0].id, old_defect.id);
        assert_eq!(defects[0].defect_number, 1);
        assert_eq!(defects[0].description, "Cap now missing");
        assert_eq!(defects[1].defect_number, 2);
        assert_eq!(defects[1].roof_element_id, None);
        assert_eq!(fx.storage.list_roof_elements(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_or_foreign_uploads_do_not_win() {
        let fx = Fixture::new();
        let uc = SyncUseCase::new(fx.storage.clone());
        let owner = fx.user(UserRole::Inspector).await;
        let other = fx.user(UserRole::Inspector).await;
        let id = Uuid::new_v4();
        let t0 = Utc::now() - Duration::minutes(10);
        uc.upload(&owner, upload(client_report(id, t0))).await.unwrap();

        let stale = uc
            .upload(&owner, upload(client_report(id, t0 - Duration::minutes(1))))
            .await
            .unwrap();
        let result = &stale.results[0];
        assert_eq!(result.outcome, SyncOutcome::Conflict);
        assert_eq!(
            result.server.as_ref().map(|b| b.report.property_address.as_str()),
            Some("5 Device Road")
        );

        let foreign = uc
            .upload(&other, upload(client_report(id, Utc::now())))
            .await
            .unwrap();
        assert_eq!(foreign.results[0].outcome, SyncOutcome::Rejected);

        // Reusing another report's element id is refused outright
        let element_id = fx.storage.list_roof_elements(id).await.unwrap()[0].id;
        let mut hijack = client_report(Uuid::new_v4(), Utc::now());
        hijack["roofElements"][0]["id"] = json!(element_id);
        let hijacked = uc.upload(&owner, upload(hijack)).await.unwrap();
        assert_eq!(hijacked.results[0].outcome, SyncOutcome::Rejected);
    }

    #[test]
    fn device_report_numbers_must_fit_the_server_sequence() {
        assert_eq!(
            accepted_report_number(Some("RPT-2026-0003"), 2026, 3).as_deref(),
            Some("RPT-2026-0003")
        );
        assert_eq!(
            accepted_report_number(Some(" RPT-2026-0001 "), 2026, 3).as_deref(),
            Some("RPT-2026-0001")
        );
        assert_eq!(accepted_report_number(Some("RPT-2026-9999"), 2026, 3), None);
        assert_eq!(accepted_report_number(Some("RPT-2026-0000"), 2026, 3), None);
        assert_eq!(accepted_report_number(Some("RPT-2025-0001"), 2026, 3), None);
        assert_eq!(accepted_report_number(Some("RPT-2026-12"), 2026, 3), None);
        assert_eq!(accepted_report_number(Some("my report"), 2026, 3), None);
        assert_eq!(accepted_report_number(None, 2026, 3), None);
    }

    #[tokio::test]
    async fn runaway_device_numbers_are_replaced() {
        let fx = Fixture::new();
        let uc = SyncUseCase::new(fx.storage.clone());
        let owner = fx.user(UserRole::Inspector).await;
        let year = Utc::now().year();
        let id = Uuid::new_v4();
        let mut bundle = client_report(id, Utc::now());
        bundle["report"]["reportNumber"] = json!(format!("RPT-{year}-9999"));

        let response = uc.upload(&owner, upload(bundle)).await.unwrap();
        assert_eq!(response.results[0].outcome, SyncOutcome::Created);
        let stored = fx.storage.get_report(id).await.unwrap().unwrap();
        assert_eq!(stored.report_number, report_number(year, 1));
        assert_eq!(fx.storage.next_report_sequence(year).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn accepted_uploads_are_stamped_with_server_time() {
        let fx = Fixture::new();
        let uc = SyncUseCase::new(fx.storage.clone());
        let owner = fx.user(UserRole::Inspector).await;
        let reviewer = fx.user(UserRole::Reviewer).await;
        let seen = uc.pull(&reviewer, None).await.unwrap();

        // Edited offline before the reviewer's pull, uploaded after it
        let id = Uuid::new_v4();
        let offline = seen.server_time - Duration::minutes(10);
        let response = uc.upload(&owner, upload(client_report(id, offline))).await.unwrap();
        let result = &response.results[0];
        assert_eq!(result.outcome, SyncOutcome::Created);
        assert_eq!(result.updated_at, Some(response.server_time));

        let changes = uc.pull(&reviewer, Some(seen.server_time)).await.unwrap();
        assert_eq!(changes.reports.len(), 1);
        assert_eq!(changes.reports[0].report.id, id);
    }

    #[tokio::test]
    async fn pull_returns_changes_since_a_point_in_time() {
        let fx = Fixture::new();
        let uc = SyncUseCase::new(fx.storage.clone());
        let owner = fx.user(UserRole::Inspector).await;
        let other = fx.user(UserRole::Inspector).await;
        let t0 = Utc::now() - Duration::minutes(10);
        uc.upload(&owner, upload(client_report(Uuid::new_v4(), t0))).await.unwrap();
        uc.upload(&other, upload(client_report(Uuid::new_v4(), t0))).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;

        let everything = uc.pull(&owner, None).await.unwrap();
        assert_eq!(everything.reports.len(), 1);
        assert_eq!(everything.reports[0].roof_elements.len(), 1);

        let nothing_new = uc.pull(&owner, Some(everything.server_time)).await.unwrap();
        assert!(nothing_new.reports.is_empty());
    }
}
