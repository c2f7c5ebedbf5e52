use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::pdf_response;
use crate::app::report_use_case::SignatureInput;
use crate::app::validation::ValidationReport;
use crate::domain::{
    ComplianceAssessment, ComplianceInput, NewReport, Report, ReportBundle, ReportFilter,
    ReportStatus, ReportUpdate,
};
use crate::error::Result;
use crate::server::extract::{ActingUser, Json, Path, Query};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub to: ReportStatus,
}

pub async fn list_reports(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Query(filter): Query<ReportFilter>,
) -> Result<Json<Vec<Report>>> {
    Ok(Json(state.reports().list(&acting, filter).await?))
}

pub async fn create_report(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Json(input): Json<NewReport>,
) -> Result<impl IntoResponse> {
    let report = state.reports().create(&acting, input).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn get_report(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportBundle>> {
    Ok(Json(state.reports().get_bundle(&acting, id).await?))
}

pub async fn update_report(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
    Json(update): Json<ReportUpdate>,
) -> Result<Json<Report>> {
    Ok(Json(state.reports().update(&acting, id, update).await?))
}

pub async fn delete_report(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.reports().delete(&acting, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn validate_report(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ValidationReport>> {
    Ok(Json(state.reports().validate(&acting, id).await?))
}

pub async fn transition_report(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Report>> {
    Ok(Json(state.reports().transition(&acting, id, request.to).await?))
}

pub async fn submit_report(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Report>> {
    Ok(Json(state.reports().submit(&acting, id).await?))
}

pub async fn sign_report(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
    Json(input): Json<SignatureInput>,
) -> Result<Json<Report>> {
    Ok(Json(state.reports().sign(&acting, id, input).await?))
}

pub async fn report_pdf(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let (number, bytes) = state.reports().pdf(&acting, id).await?;
    Ok(pdf_response(&format!("{}.pdf", number), bytes))
}

pub async fn get_compliance(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<ComplianceAssessment>>> {
    Ok(Json(state.reports().get_compliance(&acting, id).await?))
}

pub async fn put_compliance(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ComplianceInput>,
) -> Result<Json<ComplianceAssessment>> {
    Ok(Json(state.reports().put_compliance(&acting, id, input).await?))
}
