//! Real-time event streaming via Server-Sent Events.

use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use broadcast_core::BroadcastEvent;
use futures_util::stream::{self, Stream};
use tokio::sync::broadcast;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/admin/events", get(event_stream))
}

/// Format an event for SSE.
pub fn sse_event(event: &BroadcastEvent) -> Event {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event_name(event)).data(json)
}

fn event_name(event: &BroadcastEvent) -> &'static str {
    match event {
        BroadcastEvent::Created { .. } => "created",
        BroadcastEvent::RecipientDelivered { .. } => "recipient_delivered",
        BroadcastEvent::RecipientFailed { .. } => "recipient_failed",
        BroadcastEvent::Requeued { .. } => "requeued",
        BroadcastEvent::Retried { .. } => "retried",
        BroadcastEvent::Completed { .. } => "completed",
        BroadcastEvent::Clicked { .. } => "clicked",
    }
}

/// Stream pipeline events until the client disconnects.
async fn event_stream(
    State(state): State<AppState>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let rx = actors::subscribe(&state.supervisor).map_err(|e| {
        tracing::error!("Failed to subscribe to events: {}", e);
        ApiError::service_unavailable("Event stream unavailable")
    })?;

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((Ok(sse_event(&event)), rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("SSE client lagged by {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadcast_core::BroadcastId;

    #[test]
    fn event_names_follow_the_payload_tag() {
        let event = BroadcastEvent::Retried {
            broadcast_id: BroadcastId::new(),
            count: 2,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event_name(&event));
    }
}
