//! Broadcast operator routes: start, worker, status, history, details and retry.

use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use broadcast_core::{
    BroadcastEvent, BroadcastId, BroadcastMessage, BroadcastStats, BroadcastStatus, ExportKind,
    RecipientId,
};
use chrono::Utc;
use db::repositories::{BroadcastDetails, HistoryEntry};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Create the broadcast router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/broadcast/start", post(start_broadcast))
        .route("/api/admin/broadcast/worker", post(run_worker))
        .route("/api/admin/broadcast/status", get(broadcast_status))
        .route("/api/admin/broadcast/history", get(broadcast_history))
        .route("/api/admin/broadcast/details", get(broadcast_details))
        .route("/api/admin/broadcast/retry", post(retry_failed))
}

/// Message fields as submitted; any of them may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
}

impl MessageInput {
    fn into_message(self) -> Option<BroadcastMessage> {
        match (self.title, self.body, self.target_url) {
            (Some(title), Some(body), Some(target_url)) => {
                Some(BroadcastMessage::new(title, body, target_url))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub message: Option<MessageInput>,
    /// Explicit recipients; the whole directory when omitted.
    #[serde(default)]
    pub recipients: Option<Vec<u64>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    pub broadcast_id: BroadcastId,
    pub total_users: u64,
}

/// Body of the worker and retry routes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRef {
    #[serde(default)]
    pub broadcast_id: Option<String>,
}

impl BroadcastRef {
    fn id(&self) -> ApiResult<BroadcastId> {
        let raw = self
            .broadcast_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing broadcastId"))?;
        Ok(BroadcastId::parse(raw)?)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    pub success: bool,
    pub stats: BroadcastStats,
    pub processed: u64,
    pub exhausted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryResponse {
    pub success: bool,
    pub retried_count: u64,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub broadcasts: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

impl IdQuery {
    fn id(&self) -> ApiResult<BroadcastId> {
        let raw = self
            .id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing broadcast ID"))?;
        Ok(BroadcastId::parse(raw)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DetailsQuery {
    pub id: Option<String>,
    pub action: Option<String>,
    pub export: Option<String>,
}

/// Create a broadcast and enqueue its recipients.
async fn start_broadcast(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<StartRequest>,
) -> ApiResult<Json<StartResponse>> {
    let message = request
        .message
        .and_then(MessageInput::into_message)
        .ok_or_else(|| ApiError::bad_request("Missing required message fields"))?;
    message.validate()?;

    let recipients: Vec<RecipientId> = match request.recipients {
        Some(fids) => fids.into_iter().map(RecipientId).collect(),
        None => state.recipients.all().await?,
    };

    let broadcast_id = state.broadcasts.create(recipients, &message).await?;
    let stats = state.broadcasts.stats(broadcast_id).await?;

    actors::publish(
        &state.supervisor,
        BroadcastEvent::Created {
            broadcast_id,
            total: stats.total,
            timestamp: Utc::now(),
        },
    );

    Ok(Json(StartResponse {
        success: true,
        broadcast_id,
        total_users: stats.total,
    }))
}

/// Run one worker pass and report the counters it left behind.
async fn run_worker(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<BroadcastRef>,
) -> ApiResult<Json<WorkerResponse>> {
    let id = request.id()?;
    let report = actors::run_worker(&state.supervisor, id).await?;

    Ok(Json(WorkerResponse {
        success: true,
        stats: report.stats,
        processed: report.processed,
        exhausted: report.exhausted,
    }))
}

async fn broadcast_status(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> ApiResult<Json<BroadcastStatus>> {
    let id = query.id()?;
    let status = state.analytics.status(id, Utc::now()).await?;
    Ok(Json(status))
}

async fn broadcast_history(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let broadcasts = state.analytics.history(limit).await?;
    Ok(Json(HistoryResponse { broadcasts }))
}

/// Full details, or a CSV download with `action=export&export=<kind>`.
async fn broadcast_details(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DetailsQuery>,
) -> ApiResult<Response> {
    let id = IdQuery {
        id: query.id.clone(),
    }
    .id()?;

    if let (Some("export"), Some(kind)) = (query.action.as_deref(), query.export.as_deref()) {
        let kind: ExportKind = kind.parse()?;
        let csv = state.analytics.export(id, kind).await?;
        let disposition = format!(
            "attachment; filename=\"broadcast_{}_{}.csv\"",
            id,
            kind.as_str()
        );
        return Ok((
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            csv,
        )
            .into_response());
    }

    let details: BroadcastDetails = state.analytics.details(id, Utc::now()).await?;
    Ok(Json(details).into_response())
}

/// Move every failed recipient back to pending.
async fn retry_failed(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<BroadcastRef>,
) -> ApiResult<Json<RetryResponse>> {
    let id = request.id()?;
    let retried_count = state.broadcasts.retry_failed(id).await?;

    if retried_count > 0 {
        actors::publish(
            &state.supervisor,
            BroadcastEvent::Retried {
                broadcast_id: id,
                count: retried_count,
                timestamp: Utc::now(),
            },
        );
    }

    Ok(Json(RetryResponse {
        success: true,
        retried_count,
    }))
}
