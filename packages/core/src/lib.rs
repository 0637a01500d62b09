//! Core domain types for the broadcast delivery pipeline.
//!
//! This crate contains shared types used across all packages:
//! - Broadcast ids, recipients and the notification message
//! - Counters and the explicit broadcast lifecycle
//! - Status, funnel and click analytics plus CSV export
//! - Events for real-time updates

mod analytics;
mod broadcast;
mod error;
mod events;
mod stats;

pub use analytics::{
    BroadcastAnalytics, BroadcastStatus, ClickRecord, ClickTiming, EngagementFunnel,
    ErrorCategory, ExportKind, FailedRecipient, clicks_csv, error_breakdown, eta_secs,
    failed_csv, iso_millis, progress, success_csv,
};
pub use broadcast::{BroadcastId, BroadcastMessage, RecipientId, TrackingRef, unique_recipients};
pub use error::ValidationError;
pub use events::BroadcastEvent;
pub use stats::{BroadcastState, BroadcastStats};
