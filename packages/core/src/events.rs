//! Event types for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BroadcastId, BroadcastStats, RecipientId};

/// Events emitted by the broadcast pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BroadcastEvent {
    /// A broadcast was created and its recipients enqueued.
    Created {
        broadcast_id: BroadcastId,
        total: u64,
        timestamp: DateTime<Utc>,
    },
    /// A notification reached its recipient.
    RecipientDelivered {
        broadcast_id: BroadcastId,
        recipient: RecipientId,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
    /// A recipient reached a terminal failure.
    RecipientFailed {
        broadcast_id: BroadcastId,
        recipient: RecipientId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// Stranded processing entries were moved back to pending.
    Requeued {
        broadcast_id: BroadcastId,
        count: u64,
        timestamp: DateTime<Utc>,
    },
    /// Failed recipients were re-enqueued by an operator.
    Retried {
        broadcast_id: BroadcastId,
        count: u64,
        timestamp: DateTime<Utc>,
    },
    /// The pending queue and processing set are empty.
    Completed {
        broadcast_id: BroadcastId,
        stats: BroadcastStats,
        timestamp: DateTime<Utc>,
    },
    /// A tracked link was opened.
    Clicked {
        broadcast_id: BroadcastId,
        recipient: RecipientId,
        timestamp: DateTime<Utc>,
    },
}

impl BroadcastEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            BroadcastEvent::Created { timestamp, .. }
            | BroadcastEvent::RecipientDelivered { timestamp, .. }
            | BroadcastEvent::RecipientFailed { timestamp, .. }
            | BroadcastEvent::Requeued { timestamp, .. }
            | BroadcastEvent::Retried { timestamp, .. }
            | BroadcastEvent::Completed { timestamp, .. }
            | BroadcastEvent::Clicked { timestamp, .. } => *timestamp,
        }
    }

    /// Get the broadcast this event belongs to.
    pub fn broadcast_id(&self) -> BroadcastId {
        match self {
            BroadcastEvent::Created { broadcast_id, .. }
            | BroadcastEvent::RecipientDelivered { broadcast_id, .. }
            | BroadcastEvent::RecipientFailed { broadcast_id, .. }
            | BroadcastEvent::Requeued { broadcast_id, .. }
            | BroadcastEvent::Retried { broadcast_id, .. }
            | BroadcastEvent::Completed { broadcast_id, .. }
            | BroadcastEvent::Clicked { broadcast_id, .. } => *broadcast_id,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            BroadcastEvent::Created {
                broadcast_id,
                total,
                ..
            } => format!("Broadcast {} created for {} recipients", broadcast_id, total),
            BroadcastEvent::RecipientDelivered {
                broadcast_id,
                recipient,
                attempts,
                ..
            } => format!(
                "Broadcast {} delivered to {} after {} attempt(s)",
                broadcast_id, recipient, attempts
            ),
            BroadcastEvent::RecipientFailed {
                broadcast_id,
                recipient,
                error,
                ..
            } => format!("Broadcast {} failed for {}: {}", broadcast_id, recipient, error),
            BroadcastEvent::Requeued {
                broadcast_id,
                count,
                ..
            } => format!("Broadcast {} requeued {} stranded recipients", broadcast_id, count),
            BroadcastEvent::Retried {
                broadcast_id,
                count,
                ..
            } => format!("Broadcast {} retrying {} failed recipients", broadcast_id, count),
            BroadcastEvent::Completed {
                broadcast_id,
                stats,
                ..
            } => format!(
                "Broadcast {} completed: {} sent, {} failed",
                broadcast_id, stats.sent, stats.failed
            ),
            BroadcastEvent::Clicked {
                broadcast_id,
                recipient,
                ..
            } => format!("Broadcast {} clicked by {}", broadcast_id, recipient),
        }
    }
}
