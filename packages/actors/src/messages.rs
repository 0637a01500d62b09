//! Message types for actor communication.

use broadcast_core::{BroadcastEvent, BroadcastId};
use ractor::RpcReplyPort;

use crate::worker::WorkerReport;

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Drain the broadcast, reply with the report, then stop.
    Drain {
        reply: RpcReplyPort<Result<WorkerReport, WorkerError>>,
    },
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Run a worker for one broadcast until its queue drains or the run
    /// budget is spent.
    RunWorker {
        broadcast_id: BroadcastId,
        reply: RpcReplyPort<Result<WorkerReport, WorkerError>>,
    },

    /// Publish an event to all subscribers.
    Publish { event: BroadcastEvent },

    /// Subscribe to events.
    Subscribe {
        sender: tokio::sync::broadcast::Sender<BroadcastEvent>,
    },

    /// Number of worker runs in flight.
    RunningWorkers { reply: RpcReplyPort<usize> },

    /// Cancel running workers and stop.
    Shutdown,

    /// Periodic tick: requeue stale processing entries.
    Tick,
}

/// Error type for worker runs.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Broadcast not found: {0}")]
    BroadcastNotFound(BroadcastId),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Actor error: {0}")]
    Actor(String),
}
