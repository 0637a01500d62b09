//! Click tracking.

use broadcast_core::{BroadcastId, RecipientId};
use chrono::{DateTime, Utc};

use crate::keys::{BroadcastKeys, field};
use crate::{DbError, Store};

/// Repository recording tracked-link opens.
#[derive(Clone)]
pub struct ClickRepository {
    store: Store,
}

impl ClickRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record that `recipient` opened the broadcast's link at `at`.
    ///
    /// The click map keeps only the latest time per recipient, while the
    /// `clicks` counter grows on every call: it counts click events, not
    /// unique clickers. Returns the new counter value.
    pub async fn record_click(
        &self,
        id: BroadcastId,
        recipient: RecipientId,
        at: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let keys = BroadcastKeys::new(id);
        if self.store.hash_get_all(&keys.stats).await?.is_empty() {
            return Err(DbError::NotFound(format!("Broadcast not found: {}", id)));
        }

        self.store
            .hash_set(
                &keys.clicks,
                &[(recipient.to_string(), at.timestamp_millis().to_string())],
            )
            .await?;
        let clicks = self.store.hash_incr(&keys.stats, field::CLICKS, 1).await?;

        tracing::debug!(broadcast_id = %id, recipient = %recipient, "Click recorded");
        Ok(clicks.max(0) as u64)
    }
}
