//! Broadcast domain types: identifiers, message payload and tracking refs.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::ValidationError;

/// Unique identifier for a broadcast, using ULID for chronological sorting.
///
/// The embedded timestamp doubles as the broadcast's creation date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadcastId(pub Ulid);

impl BroadcastId {
    /// Create a new unique broadcast ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a broadcast ID from a string.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| ValidationError::InvalidBroadcastId(format!("{s}: {e}")))
    }

    /// When this broadcast was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.0.datetime())
    }
}

impl Default for BroadcastId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BroadcastId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Opaque numeric identifier of a notification target (a Farcaster id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(pub u64);

impl std::fmt::Display for RecipientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecipientId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ValidationError::InvalidRecipient(s.to_string()))
    }
}

impl From<u64> for RecipientId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Notification payload shared by every recipient of a broadcast.
///
/// Titles are conventionally at most 32 characters and bodies at most 128;
/// neither limit is enforced here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    pub title: String,
    pub body: String,
    pub target_url: String,
}

impl BroadcastMessage {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        target_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            target_url: target_url.into(),
        }
    }

    /// Check that every required field is present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if self.body.trim().is_empty() {
            return Err(ValidationError::MissingField("body"));
        }
        if self.target_url.trim().is_empty() {
            return Err(ValidationError::MissingField("targetUrl"));
        }
        Ok(())
    }

    /// Target URL with a `notif` parameter attributing clicks to `recipient`.
    pub fn tracking_url(&self, broadcast_id: BroadcastId, recipient: RecipientId) -> String {
        let separator = if self.target_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}notif={}",
            self.target_url,
            separator,
            TrackingRef::new(broadcast_id, recipient)
        )
    }
}

/// Reference embedded in tracking links: `<broadcastId>_<recipientId>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingRef {
    pub broadcast_id: BroadcastId,
    pub recipient: RecipientId,
}

impl TrackingRef {
    pub fn new(broadcast_id: BroadcastId, recipient: RecipientId) -> Self {
        Self {
            broadcast_id,
            recipient,
        }
    }
}

impl std::fmt::Display for TrackingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.broadcast_id, self.recipient)
    }
}

impl FromStr for TrackingRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, recipient) = s
            .split_once('_')
            .ok_or_else(|| ValidationError::InvalidTrackingRef(s.to_string()))?;
        Ok(Self {
            broadcast_id: id.parse()?,
            recipient: recipient.parse()?,
        })
    }
}

/// Validate a recipient list for a new broadcast, dropping duplicates while
/// keeping first-seen order.
pub fn unique_recipients(
    recipients: impl IntoIterator<Item = RecipientId>,
) -> Result<Vec<RecipientId>, ValidationError> {
    let mut seen = std::collections::HashSet::new();
    let unique: Vec<RecipientId> = recipients
        .into_iter()
        .filter(|r| seen.insert(*r))
        .collect();

    if unique.is_empty() {
        return Err(ValidationError::EmptyRecipients);
    }
    Ok(unique)
}
