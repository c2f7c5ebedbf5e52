use axum::extract::multipart::{Field, Multipart};
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use std::str::FromStr;
use uuid::Uuid;

use crate::app::report_items_use_case::PhotoUpload;
use crate::domain::{Photo, PhotoMeta, PhotoUpdate};
use crate::error::{AppError, Result};
use crate::server::extract::{ActingUser, Json, Path};
use crate::server::AppState;

fn multipart_error(err: impl std::fmt::Display) -> AppError {
    AppError::BadRequest(format!("malformed multipart body: {}", err))
}

async fn text(field: Field<'_>) -> Result<Option<String>> {
    let value = field.text().await.map_err(multipart_error)?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

fn parse<T: FromStr>(field: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| AppError::invalid(field, format!("'{}' is not a valid {}", v, field)))
        })
        .transpose()
}

/// Reads the `file` part plus optional metadata text parts.
async fn read_upload(mut multipart: Multipart) -> Result<(PhotoUpload, PhotoMeta)> {
    let mut upload = None;
    let mut meta = PhotoMeta::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                upload = Some(PhotoUpload {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "caption" => meta.caption = text(field).await?,
            "defectId" => meta.defect_id = parse::<Uuid>("defectId", text(field).await?)?,
            "roofElementId" => {
                meta.roof_element_id = parse::<Uuid>("roofElementId", text(field).await?)?
            }
            "sortOrder" => meta.sort_order = parse::<i32>("sortOrder", text(field).await?)?,
            "takenAt" => meta.taken_at = parse::<DateTime<Utc>>("takenAt", text(field).await?)?,
            "latitude" => meta.latitude = parse::<f64>("latitude", text(field).await?)?,
            "longitude" => meta.longitude = parse::<f64>("longitude", text(field).await?)?,
            other => tracing::debug!("ignoring multipart field {}", other),
        }
    }

    let upload = upload.ok_or_else(|| AppError::invalid("file", "a photo file is required"))?;
    Ok((upload, meta))
}

pub async fn list_photos(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(report_id): Path<Uuid>,
) -> Result<Json<Vec<Photo>>> {
    Ok(Json(state.items().list_photos(&acting, report_id).await?))
}

pub async fn upload_photo(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path(report_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let (upload, meta) = read_upload(multipart).await?;
    let photo = state
        .items()
        .upload_photo(&acting, report_id, upload, meta)
        .await?;
    Ok((StatusCode::CREATED, Json(photo)))
}

pub async fn update_photo(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path((report_id, photo_id)): Path<(Uuid, Uuid)>,
    Json(update): Json<PhotoUpdate>,
) -> Result<Json<Photo>> {
    let photo = state
        .items()
        .update_photo(&acting, report_id, photo_id, update)
        .await?;
    Ok(Json(photo))
}

pub async fn delete_photo(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path((report_id, photo_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state.items().delete_photo(&acting, report_id, photo_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn photo_file(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Path((report_id, photo_id)): Path<(Uuid, Uuid)>,
) -> Result<Response> {
    let (photo, bytes) = state.items().photo_file(&acting, report_id, photo_id).await?;
    // Binaries are content addressed, so a URL never changes meaning
    Ok((
        [
            (CONTENT_TYPE, photo.mime_type),
            (CACHE_CONTROL, "private, max-age=31536000, immutable".to_string()),
        ],
        bytes,
    )
        .into_response())
}
