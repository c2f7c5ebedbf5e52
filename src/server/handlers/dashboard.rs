use axum::extract::State;
use axum::response::Json;

use crate::app::Dashboard;
use crate::error::Result;
use crate::server::extract::ActingUser;
use crate::server::AppState;

pub async fn dashboard(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
) -> Result<Json<Dashboard>> {
    Ok(Json(state.dashboard().dashboard(&acting).await?))
}
