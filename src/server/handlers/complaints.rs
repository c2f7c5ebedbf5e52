use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use super::pdf_response;
use crate::domain::{ComplaintUpdate, LbpComplaint, NewComplaint};
use crate::error::Result;
use crate::pdf::complaint_reference;
use crate::server::extract::{ActingUser, Json, Path};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    #[serde(default)]
    pub board_reference: String,
}

pub async fn list_complaints(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
) -> Result<Json<Vec<LbpComplaint>>> {
    Ok(Json(state.complaints().list(&acting).await?))
}

pub async fn create_complaint(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Json(input): Json<NewComplaint>,
) -> Result<impl IntoResponse> {
    let complaint = state.complaints().create(&acting, input).await?;
    Ok((StatusCode::CREATED, Json(complaint)))
}

pub async fn get_complaint(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LbpComplaint>> {
    Ok(Json(state.complaints().get(&acting, id).await?))
}

pub async fn update_complaint(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
    Json(update): Json<ComplaintUpdate>,
) -> Result<Json<LbpComplaint>> {
    Ok(Json(state.complaints().update(&acting, id, update).await?))
}

pub async fn submit_complaint(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LbpComplaint>> {
    Ok(Json(state.complaints().submit(&acting, id).await?))
}

pub async fn acknowledge_complaint(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AcknowledgeRequest>,
) -> Result<Json<LbpComplaint>> {
    let complaint = state
        .complaints()
        .acknowledge(&acting, id, &request.board_reference)
        .await?;
    Ok(Json(complaint))
}

pub async fn close_complaint(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LbpComplaint>> {
    Ok(Json(state.complaints().close(&acting, id).await?))
}

pub async fn withdraw_complaint(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LbpComplaint>> {
    Ok(Json(state.complaints().withdraw(&acting, id).await?))
}

pub async fn complaint_pdf(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let complaints = state.complaints();
    let complaint = complaints.get(&acting, id).await?;
    let bytes = complaints.pdf(&acting, id).await?;
    Ok(pdf_response(
        &format!("{}.pdf", complaint_reference(&complaint)),
        bytes,
    ))
}
