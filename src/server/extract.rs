//! Acting-user identification. The caller names itself with the
//! `X-User-Id` header (API clients) or the `inspector_id` cookie (pages);
//! nothing here authenticates.
//!
//! [`Json`], [`Path`] and [`Query`] wrap the axum extractors so malformed
//! bodies, path segments and query strings answer with the same JSON error
//! body as every other failure.

use axum::extract::{FromRequest, FromRequestParts};
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

use super::AppState;
use crate::constants::{USER_ID_COOKIE, USER_ID_HEADER};
use crate::domain::User;
use crate::error::AppError;

fn header_user_id(parts: &Parts) -> Option<Uuid> {
    let value = parts.headers.get(USER_ID_HEADER)?.to_str().ok()?;
    Uuid::parse_str(value.trim()).ok()
}

fn cookie_user_id(parts: &Parts) -> Option<Uuid> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == USER_ID_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

pub(crate) fn acting_user_id(parts: &Parts) -> Option<Uuid> {
    header_user_id(parts).or_else(|| cookie_user_id(parts))
}

/// The identified caller; rejects with 401 when missing or unknown.
pub struct ActingUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for ActingUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = acting_user_id(parts).ok_or(AppError::Unauthorized)?;
        let user = state.users().identify(id).await?;
        Ok(ActingUser(user))
    }
}

/// Like [`ActingUser`] but never rejects; used for bootstrap and pages.
pub struct OptionalActingUser(pub Option<User>);

#[axum::async_trait]
impl FromRequestParts<AppState> for OptionalActingUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(id) = acting_user_id(parts) else {
            return Ok(OptionalActingUser(None));
        };
        Ok(OptionalActingUser(state.storage.get_user(id).await?))
    }
}

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);
