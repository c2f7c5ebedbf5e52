use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::app::sync_use_case::{SyncPull, SyncResponse};
use crate::error::Result;
use crate::server::extract::{ActingUser, Json, Query};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PullQuery {
    pub since: Option<DateTime<Utc>>,
}

/// Takes raw JSON so schema violations come back as field-level issues.
pub async fn upload(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Json(body): Json<Value>,
) -> Result<Json<SyncResponse>> {
    Ok(Json(state.sync().upload(&acting, body).await?))
}

pub async fn pull(
    State(state): State<AppState>,
    ActingUser(acting): ActingUser,
    Query(query): Query<PullQuery>,
) -> Result<Json<SyncPull>> {
    Ok(Json(state.sync().pull(&acting, query.since).await?))
}
