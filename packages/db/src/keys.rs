//! Store key layout.
//!
//! Global keys hold the broadcast index; everything else is scoped by
//! broadcast id so distinct broadcasts never touch the same key.

use std::time::Duration;

use broadcast_core::BroadcastId;

/// Set of broadcasts with outstanding work.
pub const ACTIVE: &str = "broadcast:active";
/// List of every broadcast id ever created, newest at the head.
pub const HISTORY: &str = "broadcast:history";
/// Set of known recipient ids used when a broadcast targets everyone.
pub const RECIPIENTS: &str = "broadcast:recipients";

/// How long a broadcast's message outlives its creation.
pub const MESSAGE_TTL: Duration = Duration::from_secs(180 * 24 * 60 * 60);

/// Keys belonging to one broadcast.
#[derive(Debug, Clone)]
pub struct BroadcastKeys {
    pub message: String,
    pub pending: String,
    pub processing: String,
    pub succeeded: String,
    pub failed: String,
    pub stats: String,
    pub clicks: String,
}

impl BroadcastKeys {
    pub fn new(id: BroadcastId) -> Self {
        let prefix = format!("broadcast:{id}");
        Self {
            message: format!("{prefix}:message"),
            pending: format!("{prefix}:pending"),
            processing: format!("{prefix}:processing"),
            succeeded: format!("{prefix}:succeeded"),
            failed: format!("{prefix}:failed"),
            stats: format!("{prefix}:stats"),
            clicks: format!("{prefix}:clicks"),
        }
    }
}

/// Field names of the stats hash.
pub mod field {
    pub const TOTAL: &str = "total";
    pub const SENT: &str = "sent";
    pub const FAILED: &str = "failed";
    pub const PENDING: &str = "pending";
    pub const PROCESSING: &str = "processing";
    pub const CLICKS: &str = "clicks";
    pub const START_TIME: &str = "startTime";
    pub const END_TIME: &str = "endTime";
    pub const DURATION: &str = "duration";
    pub const STATE: &str = "state";
}
