//! Minimal server-rendered views for inspectors working in a browser.

use askama::Template;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use chrono::Utc;
use uuid::Uuid;

use super::extract::{OptionalActingUser, Path};
use super::AppState;
use crate::app::validation::{validate_report, ValidationIssue};
use crate::app::Dashboard;
use crate::domain::User;
use crate::error::Result;

struct DefectRow {
    number: i32,
    title: String,
    location: String,
    severity: &'static str,
    classification: &'static str,
}

struct ElementRow {
    element_type: &'static str,
    location: String,
    condition: &'static str,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardPage {
    user: User,
    dashboard: Dashboard,
}

#[derive(Template)]
#[template(path = "report.html")]
struct ReportPage {
    user: User,
    id: Uuid,
    report_number: String,
    status: &'static str,
    property_address: String,
    client_name: String,
    inspection_date: String,
    executive_summary: String,
    completion_percent: u8,
    issues: Vec<ValidationIssue>,
    elements: Vec<ElementRow>,
    defects: Vec<DefectRow>,
    photo_count: usize,
}

#[derive(Template)]
#[template(path = "unidentified.html")]
struct UnidentifiedPage;

fn unidentified() -> Result<Response> {
    Ok((StatusCode::UNAUTHORIZED, Html(UnidentifiedPage.render()?)).into_response())
}

pub async fn dashboard_page(
    State(state): State<AppState>,
    OptionalActingUser(user): OptionalActingUser,
) -> Result<Response> {
    let Some(user) = user else {
        return unidentified();
    };
    let dashboard = state.dashboard().dashboard(&user).await?;
    Ok(Html(DashboardPage { user, dashboard }.render()?).into_response())
}

pub async fn report_page(
    State(state): State<AppState>,
    OptionalActingUser(user): OptionalActingUser,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let Some(user) = user else {
        return unidentified();
    };
    let bundle = state.reports().get_bundle(&user, id).await?;
    let validation = validate_report(&bundle, Utc::now().date_naive());
    let report = &bundle.report;

    let page = ReportPage {
        id: report.id,
        report_number: report.report_number.clone(),
        status: report.status.label(),
        property_address: report.property_address.clone(),
        client_name: report.client_name.clone(),
        inspection_date: report
            .inspection_date
            .map(|d| d.format("%d %B %Y").to_string())
            .unwrap_or_else(|| "Not recorded".to_string()),
        executive_summary: report.executive_summary.clone().unwrap_or_default(),
        completion_percent: validation.completion_percent,
        issues: validation.issues,
        elements: bundle
            .roof_elements
            .iter()
            .map(|e| ElementRow {
                element_type: e.element_type.label(),
                location: e.location.clone(),
                condition: e.condition.label(),
            })
            .collect(),
        defects: bundle
            .defects
            .iter()
            .map(|d| DefectRow {
                number: d.defect_number,
                title: d.title.clone(),
                location: d.location.clone(),
                severity: d.severity.label(),
                classification: d.classification.label(),
            })
            .collect(),
        photo_count: bundle.photos.len(),
        user,
    };
    Ok(Html(page.render()?).into_response())
}
