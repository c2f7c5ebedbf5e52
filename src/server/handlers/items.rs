//! Roof elements and defects of a report.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::domain::{
    Defect, DefectUpdate, NewDefect, NewRoofElement, RoofElement, RoofElementUpdate,
};
use crate::error::Result;
use crate::server::extract::{ActingUser, Json, Path};
use crate::server::AppState;

pub async fn add_element(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(report_id): Path<Uuid>,
    Json(input): Json<NewRoofElement>,
) -> Result<impl IntoResponse> {
    let element = state.items().add_element(&acting, report_id, input).await?;
    Ok((StatusCode::CREATED, Json(element)))
}

pub async fn update_element(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path((report_id, element_id)): Path<(Uuid, Uuid)>,
    Json(update): Json<RoofElementUpdate>,
) -> Result<Json<RoofElement>> {
    let element = state
        .items()
        .update_element(&acting, report_id, element_id, update)
        .await?;
    Ok(Json(element))
}

pub async fn delete_element(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path((report_id, element_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state.items().delete_element(&acting, report_id, element_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_defect(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(report_id): Path<Uuid>,
    Json(input): Json<NewDefect>,
) -> Result<impl IntoResponse> {
    let defect = state.items().add_defect(&acting, report_id, input).await?;
    Ok((StatusCode::CREATED, Json(defect)))
}

pub async fn update_defect(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path((report_id, defect_id)): Path<(Uuid, Uuid)>,
    Json(update): Json<DefectUpdate>,
) -> Result<Json<Defect>> {
    let defect = state
        .items()
        .update_defect(&acting, report_id, defect_id, update)
        .await?;
    Ok(Json(defect))
}

pub async fn delete_defect(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path((report_id, defect_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state.items().delete_defect(&acting, report_id, defect_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
