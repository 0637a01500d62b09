//! Recipient directory routes.

use axum::{Json, Router, extract::State, routing::get};
use broadcast_core::RecipientId;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/admin/recipients",
        get(list_recipients).post(register_recipient),
    )
}

#[derive(Debug, Serialize)]
pub struct RecipientList {
    pub total: u64,
    pub fids: Vec<RecipientId>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub fid: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    /// False when the recipient was already known.
    pub added: bool,
}

async fn list_recipients(State(state): State<AppState>) -> ApiResult<Json<RecipientList>> {
    let fids = state.recipients.all().await?;
    Ok(Json(RecipientList {
        total: fids.len() as u64,
        fids,
    }))
}

async fn register_recipient(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let fid = request
        .fid
        .filter(|fid| *fid != 0)
        .ok_or_else(|| ApiError::bad_request("FID is required"))?;
    let added = state.recipients.register(RecipientId(fid)).await?;
    Ok(Json(RegisterResponse {
        success: true,
        added,
    }))
}
