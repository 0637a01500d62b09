//! Delivery workers and the actor system for the broadcast pipeline.
//!
//! This crate provides the notification transport, the delivery policy,
//! the worker loop that drains a broadcast and the Ractor-based actors
//! that run it.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor that spawns worker runs, owns the event
//!   channel and periodically requeues stale processing entries
//! - `WorkerActor` - Runs one `DeliveryWorker` pass and stops
//! - `DeliveryWorker` - Sequential claim → send → record loop
//!
//! # Usage
//!
//! ```ignore
//! use actors::{SupervisorArgs, run_worker, start_supervisor};
//!
//! let (supervisor, handle) = start_supervisor(args).await?;
//! let report = run_worker(&supervisor, broadcast_id).await?;
//! ```

mod messages;
mod policy;
mod supervisor;
mod transport;
mod worker;
mod worker_actor;

pub use messages::{SupervisorMessage, WorkerError, WorkerMessage};
pub use policy::{BackoffPolicy, DeliveryPolicy};
pub use supervisor::{
    Supervisor, SupervisorArgs, SweepConfig, publish, run_worker, start_supervisor, subscribe,
};
pub use transport::{
    DryRunTransport, FnTransport, NeynarConfig, NeynarTransport, Notification,
    NotificationTransport, SendError, SendFuture,
};
pub use worker::{DeliveryFailure, DeliveryWorker, WorkerReport, send_with_retry};
pub use worker_actor::WorkerActor;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
