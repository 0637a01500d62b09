//! Broadcast counters and lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Lifecycle of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastState {
    /// Recipients are enqueued, no worker has claimed one yet.
    #[default]
    Created,
    /// At least one recipient has been claimed and work is outstanding.
    Draining,
    /// Pending queue and processing set are both empty.
    Completed,
}

impl BroadcastState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastState::Created => "created",
            BroadcastState::Draining => "draining",
            BroadcastState::Completed => "completed",
        }
    }

    /// Reconcile a stored state with the counters it describes.
    ///
    /// The counters win whenever the two disagree, and records written
    /// before the state field existed are derived from counters alone.
    pub fn reconcile(stored: Option<Self>, stats: &BroadcastStats) -> Self {
        let outstanding = stats.outstanding() > 0;
        let touched = stats.sent + stats.failed + stats.processing > 0;

        match stored {
            Some(BroadcastState::Completed) if outstanding => BroadcastState::Draining,
            Some(BroadcastState::Completed) => BroadcastState::Completed,
            _ if !outstanding && stats.end_time.is_some() => BroadcastState::Completed,
            Some(BroadcastState::Draining) => BroadcastState::Draining,
            Some(BroadcastState::Created) if touched => BroadcastState::Draining,
            Some(BroadcastState::Created) => BroadcastState::Created,
            None if touched => BroadcastState::Draining,
            None => BroadcastState::Created,
        }
    }
}

impl std::fmt::Display for BroadcastState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BroadcastState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(BroadcastState::Created),
            "draining" => Ok(BroadcastState::Draining),
            "completed" => Ok(BroadcastState::Completed),
            other => Err(ValidationError::InvalidState(other.to_string())),
        }
    }
}

/// Counter snapshot for one broadcast.
///
/// `sent + failed + pending + processing == total` holds after every
/// individual transition; `processing` is only non-zero while a worker is
/// mid-attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastStats {
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    pub pending: u64,
    pub processing: u64,
    /// Click events, not unique clickers.
    pub clicks: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub end_time: Option<DateTime<Utc>>,
    /// `end_time - start_time` in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default)]
    pub state: BroadcastState,
}

impl BroadcastStats {
    /// Fresh counters for a broadcast of `total` recipients.
    pub fn new(total: u64, start_time: DateTime<Utc>) -> Self {
        Self {
            total,
            sent: 0,
            failed: 0,
            pending: total,
            processing: 0,
            clicks: 0,
            start_time,
            end_time: None,
            duration: None,
            state: BroadcastState::Created,
        }
    }

    /// Recipients with a terminal outcome.
    pub fn processed(&self) -> u64 {
        self.sent + self.failed
    }

    /// Recipients still waiting or mid-attempt.
    pub fn outstanding(&self) -> u64 {
        self.pending + self.processing
    }

    /// Both the pending queue and the processing set are empty.
    pub fn is_complete(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }

    /// Whether the counters add up to the total.
    pub fn is_balanced(&self) -> bool {
        self.sent + self.failed + self.pending + self.processing == self.total
    }
}
