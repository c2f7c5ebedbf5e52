//! PDF documents for reports and LBP complaints.
//!
//! Data is flattened into view structs, rendered through the text templates
//! in `templates/pdf/` and laid out by [`writer`].

pub mod writer;

use askama::Template;
use std::time::Instant;

use crate::domain::{LbpComplaint, Report, ReportBundle, ReportStatus, User};
use crate::error::Result;
use crate::observability::metrics;
use writer::PageDecor;

const NOT_RECORDED: &str = "Not recorded";

/// Marks every line of free text as literal so user input cannot inject
/// layout markup.
fn text_block(value: &Option<String>) -> String {
    match value.as_deref().map(str::trim) {
        None | Some("") => format!("\\{NOT_RECORDED}"),
        Some(text) => text
            .lines()
            .map(|l| format!("\\{}", l.trim()))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn or_not_recorded(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(NOT_RECORDED)
        .replace('\n', " ")
}

fn one_line(value: &str) -> String {
    value.replace('\n', " ")
}

pub struct Section {
    pub title: String,
    pub lines: Vec<String>,
}

#[derive(Template)]
#[template(path = "pdf/report.txt", escape = "none")]
struct ReportPdf {
    report_number: String,
    status: String,
    property: String,
    property_type: String,
    building_age: String,
    client: String,
    inspector: String,
    inspector_lbp: String,
    inspection_date: String,
    inspection_type: String,
    weather: String,
    access_method: String,
    scope_of_works: String,
    limitations: String,
    executive_summary: String,
    elements: Vec<Section>,
    defects: Vec<Section>,
    compliance_outcome: String,
    compliance_items: Vec<String>,
    compliance_notes: String,
    conclusions: String,
    recommendations: String,
    photos: Vec<String>,
    signed: bool,
    signature_line: String,
}

impl ReportPdf {
    fn build(bundle: &ReportBundle, inspector: &User) -> Self {
        let r = &bundle.report;

        let elements = bundle
            .roof_elements
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let mut lines = vec![
                    format!("Location: {}", one_line(&e.location)),
                    format!("Condition: {}", e.condition.label()),
                    format!("Material: {}", or_not_recorded(&e.material)),
                ];
                if let Some(m) = &e.manufacturer {
                    lines.push(format!("Manufacturer: {}", one_line(m)));
                }
                if let Some(p) = e.pitch_degrees {
                    lines.push(format!("Pitch: {p:.0} degrees"));
                }
                if let Some(a) = e.area_m2 {
                    lines.push(format!("Area: {a:.1} m2"));
                }
                if let Some(y) = e.age_years {
                    lines.push(format!("Approximate age: {y} years"));
                }
                if e.comments.is_some() {
                    lines.push(text_block(&e.comments));
                }
                Section {
                    title: format!("{}. {}", i + 1, e.element_type.label()),
                    lines,
                }
            })
            .collect();

        let photo_number = |id| {
            bundle
                .photos
                .iter()
                .position(|p| p.id == id)
                .map(|i| i + 1)
        };

        let defects = bundle
            .defects
            .iter()
            .map(|d| {
                let mut lines = vec![
                    format!(
                        "Classification: {}. Severity: {}",
                        d.classification.label(),
                        d.severity.label()
                    ),
                    format!("Location: {}", one_line(&d.location)),
                    text_block(&Some(d.description.clone())),
                ];
                for (label, value) in [
                    ("Observation", &d.observation),
                    ("Analysis", &d.analysis),
                    ("Opinion", &d.opinion),
                    ("Building Code reference", &d.code_clause),
                    ("Recommendation", &d.recommendation),
                ] {
                    if value.is_some() {
                        lines.push(format!("{label}:"));
                        lines.push(text_block(value));
                    }
                }
                let photos: Vec<String> = bundle
                    .photos_for_defect(d.id)
                    .filter_map(|p| photo_number(p.id))
                    .map(|n| n.to_string())
                    .collect();
                if !photos.is_empty() {
                    lines.push(format!("Photos: {}", photos.join(", ")));
                }
                Section {
                    title: format!("Defect {}: {}", d.defect_number, one_line(&d.title)),
                    lines,
                }
            })
            .collect();

        let (compliance_outcome, compliance_items, compliance_notes) = match &bundle.compliance {
            Some(c) => (
                c.outcome().label().to_string(),
                c.items
                    .iter()
                    .map(|i| match i.notes.as_deref() {
                        Some(n) if !n.trim().is_empty() => {
                            format!("{}: {}. {}", i.clause.label(), i.status.label(), one_line(n))
                        }
                        _ => format!("{}: {}", i.clause.label(), i.status.label()),
                    })
                    .collect(),
                text_block(&c.overall_notes),
            ),
            None => ("Not assessed".to_string(), Vec::new(), text_block(&None)),
        };

        let photos = bundle
            .photos
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let caption = p
                    .caption
                    .as_deref()
                    .map(one_line)
                    .unwrap_or_else(|| p.filename.clone());
                format!("Photo {}: {}", i + 1, caption)
            })
            .collect();

        let signature_line = match r.signed_at {
            Some(at) if r.is_signed() => format!(
                "Signed by {} on {}",
                one_line(&inspector.name),
                at.format("%d %B %Y")
            ),
            _ => "Not signed".to_string(),
        };

        ReportPdf {
            report_number: r.report_number.clone(),
            status: r.status.label().to_string(),
            property: one_line(&r.full_address()),
            property_type: r
                .property_type
                .map_or(NOT_RECORDED, |t| t.label())
                .to_string(),
            building_age: r
                .building_age
                .map_or_else(|| NOT_RECORDED.to_string(), |a| format!("{a} years")),
            client: one_line(&r.client_name),
            inspector: one_line(&inspector.name),
            inspector_lbp: or_not_recorded(&inspector.lbp_number),
            inspection_date: r
                .inspection_date
                .map_or_else(|| NOT_RECORDED.to_string(), |d| d.format("%d %B %Y").to_string()),
            inspection_type: r
                .inspection_type
                .map_or(NOT_RECORDED, |t| t.label())
                .to_string(),
            weather: or_not_recorded(&r.weather_conditions),
            access_method: or_not_recorded(&r.access_method),
            scope_of_works: text_block(&r.scope_of_works),
            limitations: text_block(&r.limitations),
            executive_summary: text_block(&r.executive_summary),
            elements,
            defects,
            compliance_outcome,
            compliance_items,
            compliance_notes,
            conclusions: text_block(&r.conclusions),
            recommendations: text_block(&r.recommendations),
            photos,
            signed: r.is_signed(),
            signature_line,
        }
    }
}

/// Renders the inspection report. Anything short of finalised carries a
/// DRAFT banner.
pub fn render_report(bundle: &ReportBundle, inspector: &User) -> Result<Vec<u8>> {
    let started = Instant::now();
    let markup = ReportPdf::build(bundle, inspector).render()?;
    let pdf = writer::render(
        &markup,
        &PageDecor {
            reference: bundle.report.report_number.clone(),
            draft: bundle.report.status != ReportStatus::Finalised,
            title: format!("Roof inspection report {}", bundle.report.report_number),
        },
    );
    metrics::pdf::rendered("report", started.elapsed().as_secs_f64());
    Ok(pdf)
}

#[derive(Template)]
#[template(path = "pdf/complaint.txt", escape = "none")]
struct ComplaintPdf {
    reference: String,
    status: String,
    submitted: String,
    complainant: String,
    complainant_contact: String,
    lbp_number: String,
    lbp_name: String,
    licence_class: String,
    site_address: String,
    work_description: String,
    grounds: Vec<String>,
    conduct_description: String,
    desired_outcome: String,
    report_reference: String,
    evidence: Vec<String>,
    board_reference: String,
}

pub fn complaint_reference(complaint: &LbpComplaint) -> String {
    let id = complaint.id.simple().to_string();
    format!("LBP-{}", id[..8].to_uppercase())
}

/// Renders a complaint to the Building Practitioners Board. `report` is the
/// linked inspection report, if any.
pub fn render_complaint(
    complaint: &LbpComplaint,
    complainant: &User,
    report: Option<&Report>,
) -> Result<Vec<u8>> {
    let started = Instant::now();
    let reference = complaint_reference(complaint);
    let contact: Vec<&str> = [Some(complainant.email.as_str()), complainant.phone.as_deref()]
        .into_iter()
        .flatten()
        .collect();

    let view = ComplaintPdf {
        reference: reference.clone(),
        status: complaint.status.label().to_string(),
        submitted: complaint
            .submitted_at
            .map_or_else(|| "Not submitted".to_string(), |t| t.format("%d %B %Y").to_string()),
        complainant: one_line(&complainant.name),
        complainant_contact: contact.join(", "),
        lbp_number: complaint.lbp_number.clone(),
        lbp_name: one_line(&complaint.lbp_name),
        licence_class: complaint
            .licence_class
            .map_or(NOT_RECORDED, |c| c.label())
            .to_string(),
        site_address: one_line(&complaint.site_address),
        work_description: text_block(&complaint.work_description),
        grounds: complaint.grounds.iter().map(|g| g.label().to_string()).collect(),
        conduct_description: text_block(&Some(complaint.conduct_description.clone())),
        desired_outcome: text_block(&complaint.desired_outcome),
        report_reference: report.map_or_else(
            || "None".to_string(),
            |r| format!("{} ({})", r.report_number, one_line(&r.full_address())),
        ),
        evidence: complaint
            .evidence_photo_ids
            .iter()
            .map(|id| id.to_string())
            .collect(),
        board_reference: or_not_recorded(&complaint.board_reference),
    };
    let markup = view.render()?;
    let pdf = writer::render(
        &markup,
        &PageDecor {
            reference,
            draft: complaint.submitted_at.is_none(),
            title: "Complaint about a licensed building practitioner".to_string(),
        },
    );
    metrics::pdf::rendered("complaint", started.elapsed().as_secs_f64());
    Ok(pdf)
}
