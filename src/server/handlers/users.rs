use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::domain::{NewUser, User, UserProfileUpdate};
use crate::error::Result;
use crate::server::extract::{ActingUser, Json, OptionalActingUser};
use crate::server::AppState;

pub async fn create_user(
    State(state): State<AppState>,
    OptionalActingUser(acting): OptionalActingUser,
    Json(input): Json<NewUser>,
) -> Result<impl IntoResponse> {
    let user = state.users().create(acting.as_ref(), input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_users(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
) -> Result<Json<Vec<User>>> {
    Ok(Json(state.users().list(&acting).await?))
}

pub async fn me(ActingUser(acting): ActingUser) -> Json<User> {
    Json(acting)
}

pub async fn update_me(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Json(update): Json<UserProfileUpdate>,
) -> Result<Json<User>> {
    Ok(Json(state.users().update_profile(&acting, update).await?))
}
