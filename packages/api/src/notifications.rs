//! Single test sends and click tracking.

use actors::{Notification, send_with_retry};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header},
    routing::post,
};
use broadcast_core::{BroadcastEvent, BroadcastId, RecipientId, TrackingRef};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::state::AppState;

const TEST_TITLE: &str = "🌟 Galaxy Update";
const TEST_BODY: &str = "New stars have entered your galaxy. One of them is rising fast.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/test-notification", post(test_notification))
        .route("/api/track-notification-click", post(track_click))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestNotificationRequest {
    #[serde(default)]
    pub fid: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TestNotificationResponse {
    pub success: bool,
    pub message: String,
    pub attempts: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickRequest {
    #[serde(default)]
    pub notif_id: Option<String>,
    #[serde(default)]
    pub fid: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickResponse {
    pub success: bool,
    pub broadcast_id: BroadcastId,
    pub fid: RecipientId,
}

/// Origin of the incoming request, used as the default link target.
fn request_origin(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    format!("{}://{}", scheme, host)
}

/// Send one notification straight through the transport.
async fn test_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<TestNotificationRequest>,
) -> ApiResult<Json<TestNotificationResponse>> {
    let fid = request
        .fid
        .filter(|fid| *fid != 0)
        .ok_or_else(|| ApiError::bad_request("FID is required"))?;

    let notification = Notification {
        recipient: RecipientId(fid),
        title: request.title.unwrap_or_else(|| TEST_TITLE.to_string()),
        body: request.body.unwrap_or_else(|| TEST_BODY.to_string()),
        target_url: request
            .target_url
            .unwrap_or_else(|| request_origin(&headers)),
    };

    match send_with_retry(state.transport.as_ref(), &state.policy, &notification).await {
        Ok(attempts) => {
            tracing::info!(recipient = %notification.recipient, attempts, "Test notification sent");
            Ok(Json(TestNotificationResponse {
                success: true,
                message: "Test notification sent!".to_string(),
                attempts,
            }))
        }
        Err(failure) => {
            tracing::warn!(
                recipient = %notification.recipient,
                attempts = failure.attempts,
                "Test notification failed: {}",
                failure.error
            );
            Err(ApiError::bad_gateway(format!(
                "Failed to send notification: {}",
                failure.error
            )))
        }
    }
}

/// Attribute a tracked link open to its broadcast.
async fn track_click(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ClickRequest>,
) -> ApiResult<Json<ClickResponse>> {
    let (notif_id, fid) = match (request.notif_id.as_deref(), request.fid) {
        (Some(notif_id), Some(fid)) if !notif_id.is_empty() && fid != 0 => (notif_id, fid),
        _ => return Err(ApiError::bad_request("Missing parameters")),
    };

    let reference: TrackingRef = notif_id.parse()?;
    let broadcast_id = reference.broadcast_id;
    let fid = RecipientId(fid);
    let now = Utc::now();

    state.clicks.record_click(broadcast_id, fid, now).await?;
    actors::publish(
        &state.supervisor,
        BroadcastEvent::Clicked {
            broadcast_id,
            recipient: fid,
            timestamp: now,
        },
    );

    Ok(Json(ClickResponse {
        success: true,
        broadcast_id,
        fid,
    }))
}
