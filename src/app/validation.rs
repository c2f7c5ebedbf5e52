//! Completion check run before a report may go to review.
//!
//! Rules are evaluated in a fixed order so `missing_fields` is stable for
//! clients that render it as a checklist.

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{is_blank, ReportBundle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: IssueSeverity,
}

impl ValidationIssue {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: IssueSeverity::Error,
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: IssueSeverity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub completion_percent: u8,
    pub missing_fields: Vec<String>,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn from_issues(issues: Vec<ValidationIssue>, completion_percent: u8) -> Self {
        let mut missing_fields: Vec<String> = Vec::new();
        for issue in issues.iter().filter(|i| i.is_error()) {
            if !missing_fields.contains(&issue.field) {
                missing_fields.push(issue.field.clone());
            }
        }
        Self {
            valid: missing_fields.is_empty(),
            completion_percent,
            missing_fields,
            issues,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }
}

/// Number of rules that count towards `completion_percent`.
const COMPLETION_RULES: u32 = 8;

/// Runs every submission rule against a loaded report.
pub fn validate_report(bundle: &ReportBundle, today: NaiveDate) -> ValidationReport {
    let report = &bundle.report;
    let mut rules = CompletionRules::default();

    rules.check(
        !report.property_address.trim().is_empty(),
        "propertyAddress",
        "Property address is required",
    );
    rules.check(
        !report.client_name.trim().is_empty(),
        "clientName",
        "Client name is required",
    );
    let (date_ok, date_message) = match report.inspection_date {
        Some(date) if date > today => (false, "Inspection date cannot be in the future"),
        Some(_) => (true, ""),
        None => (false, "Inspection date is required"),
    };
    rules.check(date_ok, "inspectionDate", date_message);
    rules.check(
        report.inspection_type.is_some(),
        "inspectionType",
        "Inspection type is required",
    );
    rules.check(
        !is_blank(&report.weather_conditions),
        "weatherConditions",
        "Weather conditions at the time of inspection are required",
    );
    rules.check(
        !is_blank(&report.executive_summary),
        "executiveSummary",
        "Executive summary is required",
    );
    rules.check(
        !bundle.roof_elements.is_empty(),
        "roofElements",
        "At least one roof element must be recorded",
    );

    let issues = &mut rules.issues;
    for (i, element) in bundle.roof_elements.iter().enumerate() {
        if element.location.trim().is_empty() {
            issues.push(ValidationIssue::error(
                format!("roofElements[{i}].location"),
                format!("Roof element {} needs a location", i + 1),
            ));
        }
    }

    for (i, defect) in bundle.defects.iter().enumerate() {
        let n = defect.defect_number;
        if defect.description.trim().is_empty() {
            issues.push(ValidationIssue::error(
                format!("defects[{i}].description"),
                format!("Defect {n} needs a description"),
            ));
        }
        if defect.location.trim().is_empty() {
            issues.push(ValidationIssue::error(
                format!("defects[{i}].location"),
                format!("Defect {n} needs a location"),
            ));
        }
        if defect.severity.needs_recommendation() && is_blank(&defect.recommendation) {
            issues.push(ValidationIssue::error(
                format!("defects[{i}].recommendation"),
                format!(
                    "Defect {n} is {} severity and needs a recommendation",
                    defect.severity.label().to_lowercase()
                ),
            ));
        }
        if bundle.photos_for_defect(defect.id).next().is_none() {
            issues.push(ValidationIssue::error(
                format!("defects[{i}].photos"),
                format!("Defect {n} needs at least one photo"),
            ));
        }
    }

    rules.check(
        report.is_signed(),
        "signature",
        "The report must be signed and the declaration accepted",
    );

    let issues = &mut rules.issues;
    if bundle.photos.is_empty() {
        issues.push(ValidationIssue::warning(
            "photos",
            "The report has no photos",
        ));
    }
    match &bundle.compliance {
        None => issues.push(ValidationIssue::warning(
            "complianceAssessment",
            "No Building Code compliance assessment recorded",
        )),
        Some(c) if c.has_unassessed() => issues.push(ValidationIssue::warning(
            "complianceAssessment",
            "Some Building Code clauses are not assessed",
        )),
        Some(_) => {}
    }
    if is_blank(&report.recommendations) {
        issues.push(ValidationIssue::warning(
            "recommendations",
            "No overall recommendations given",
        ));
    }
    if is_blank(&report.client_email) {
        issues.push(ValidationIssue::warning(
            "clientEmail",
            "No client e-mail; the report cannot be sent electronically",
        ));
    }

    let completion = (f64::from(rules.passed) * 100.0 / f64::from(COMPLETION_RULES)).round() as u8;
    ValidationReport::from_issues(rules.issues, completion)
}

#[derive(Default)]
struct CompletionRules {
    passed: u32,
    issues: Vec<ValidationIssue>,
}

impl CompletionRules {
    fn check(&mut self, ok: bool, field: &str, message: &str) {
        if ok {
            self.passed += 1;
        } else {
            self.issues.push(ValidationIssue::error(field, message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn bare_bundle() -> ReportBundle {
        let report = Report::new(
            Uuid::new_v4(),
            "RPT-2026-0001".to_string(),
            NewReport {
                property_address: "12 Kauri Street".to_string(),
                client_name: "A. Client".to_string(),
                ..Default::default()
            },
        );
        ReportBundle {
            report,
            roof_elements: vec![],
            defects: vec![],
            photos: vec![],
            compliance: None,
        }
    }

    fn complete_bundle() -> ReportBundle {
        let mut bundle = bare_bundle();
        let report_id = bundle.report.id;
        let r = &mut bundle.report;
        r.inspection_date = NaiveDate::from_ymd_opt(2026, 3, 2);
        r.inspection_type = Some(InspectionType::Visual);
        r.weather_conditions = Some("Fine".to_string());
        r.executive_summary = Some("Roof in fair condition".to_string());
        r.recommendations = Some("Replace flashings".to_string());
        r.client_email = Some("client@example.co.nz".to_string());
        r.declaration_signed = true;
        r.signature_ref = Some("cas:sha256:ab".to_string());

        bundle.roof_elements.push(RoofElement::new(
            report_id,
            NewRoofElement {
                id: None,
                element_type: ElementType::RoofCladding,
                location: "Main roof".to_string(),
                material: None,
                manufacturer: None,
                pitch_degrees: None,
                area_m2: None,
                age_years: None,
                condition: Some(ConditionRating::Fair),
                comments: None,
            },
        ));
        let defect = Defect::new(
            report_id,
            1,
            NewDefect {
                id: None,
                roof_element_id: None,
                title: "Rust".to_string(),
                location: "North slope".to_string(),
                description: "Surface rust on laps".to_string(),
                classification: DefectClass::MinorDefect,
                severity: Severity::High,
                observation: None,
                analysis: None,
                opinion: None,
                code_clause: None,
                recommendation: Some("Treat and repaint".to_string()),
            },
        );
        bundle.photos.push(Photo {
            id: Uuid::new_v4(),
            report_id,
            defect_id: Some(defect.id),
            roof_element_id: None,
            filename: "rust.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            size_bytes: 1024,
            storage_ref: "cas:sha256:cd".to_string(),
            caption: None,
            sort_order: 0,
            taken_at: None,
            latitude: None,
            longitude: None,
            created_at: Utc::now(),
        });
        bundle.defects.push(defect);
        bundle.compliance = Some(ComplianceAssessment {
            id: Uuid::new_v4(),
            report_id,
            items: vec![ComplianceItem {
                clause: BuildingCodeClause::E2,
                status: ComplianceStatus::Compliant,
                notes: None,
            }],
            overall_notes: None,
            assessed_at: Utc::now(),
            updated_at: Utc::now(),
        });
        bundle
    }

    #[test]
    fn complete_report_passes_without_warnings() {
        let result = validate_report(&complete_bundle(), today());
        assert!(result.valid, "{:?}", result.issues);
        assert_eq!(result.completion_percent, 100);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn bare_report_lists_missing_fields_in_rule_order() {
        let result = validate_report(&bare_bundle(), today());
        assert!(!result.valid);
        assert_eq!(
            result.missing_fields,
            vec![
                "inspectionDate",
                "inspectionType",
                "weatherConditions",
                "executiveSummary",
                "roofElements",
                "signature"
            ]
        );
        // address and client name pass: 2 of 8
        assert_eq!(result.completion_percent, 25);
    }

    #[test]
    fn future_inspection_date_is_rejected() {
        let mut bundle = complete_bundle();
        bundle.report.inspection_date = NaiveDate::from_ymd_opt(2026, 3, 11);
        let result = validate_report(&bundle, today());
        assert_eq!(result.missing_fields, vec!["inspectionDate"]);
        assert_eq!(result.completion_percent, 88);
    }

    #[test]
    fn high_severity_defect_without_recommendation_or_photo_fails() {
        let mut bundle = complete_bundle();
        bundle.defects[0].recommendation = None;
        bundle.photos.clear();
        let result = validate_report(&bundle, today());
        assert_eq!(
            result.missing_fields,
            vec!["defects[0].recommendation", "defects[0].photos"]
        );
        // per-defect rules do not count towards completion
        assert_eq!(result.completion_percent, 100);
        assert!(result
            .issues
            .iter()
            .any(|i| i.field == "photos" && !i.is_error()));
    }

    #[test]
    fn low_severity_defect_needs_no_recommendation() {
        let mut bundle = complete_bundle();
        bundle.defects[0].severity = Severity::Low;
        bundle.defects[0].recommendation = None;
        assert!(validate_report(&bundle, today()).valid);
    }

    #[test]
    fn warnings_do_not_block_submission() {
        let mut bundle = complete_bundle();
        bundle.compliance = None;
        bundle.report.client_email = None;
        bundle.report.recommendations = None;
        let result = validate_report(&bundle, today());
        assert!(result.valid);
        let warned: Vec<&str> = result.issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(warned, vec!["complianceAssessment", "recommendations", "clientEmail"]);
    }
}
