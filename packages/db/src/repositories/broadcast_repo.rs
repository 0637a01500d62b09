//! Broadcast registry and per-recipient state transitions.

use std::time::Duration;

use broadcast_core::{
    BroadcastId, BroadcastMessage, BroadcastState, BroadcastStats, RecipientId, unique_recipients,
};
use chrono::{DateTime, Utc};

use crate::keys::{self, BroadcastKeys, field};
use crate::records::{decode_recipients, decode_stats, encode_stats};
use crate::{DbError, Store};

/// Recipients are enqueued in batches of this size.
const ENQUEUE_CHUNK: usize = 1000;

/// Repository owning a broadcast's lifecycle: creation, claiming recipients,
/// recording outcomes, completion and retry.
///
/// Every mutation is a single atomic store operation; counters move with
/// atomic increments so concurrent workers never lose an update.
#[derive(Clone)]
pub struct BroadcastRepository {
    store: Store,
}

impl BroadcastRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create a broadcast and enqueue every recipient.
    ///
    /// Duplicate recipients are dropped. Nothing is written when validation
    /// fails.
    pub async fn create(
        &self,
        recipients: impl IntoIterator<Item = RecipientId>,
        message: &BroadcastMessage,
    ) -> Result<BroadcastId, DbError> {
        message.validate()?;
        let recipients = unique_recipients(recipients)?;

        let id = BroadcastId::new();
        let keys = BroadcastKeys::new(id);
        let stats = BroadcastStats::new(recipients.len() as u64, Utc::now());

        self.store
            .set_with_ttl(&keys.message, &serde_json::to_string(message)?, keys::MESSAGE_TTL)
            .await?;

        for chunk in recipients.chunks(ENQUEUE_CHUNK) {
            let values: Vec<String> = chunk.iter().map(ToString::to_string).collect();
            self.store.list_push_front(&keys.pending, &values).await?;
        }

        self.store.hash_set(&keys.stats, &encode_stats(&stats)).await?;
        self.store.set_add(keys::ACTIVE, &id.to_string()).await?;
        self.store
            .list_push_front(keys::HISTORY, &[id.to_string()])
            .await?;

        tracing::info!(broadcast_id = %id, total = stats.total, "Broadcast created");
        Ok(id)
    }

    /// Counters for a broadcast, or `None` if it does not exist.
    pub async fn find_stats(&self, id: BroadcastId) -> Result<Option<BroadcastStats>, DbError> {
        let keys = BroadcastKeys::new(id);
        let raw = self.store.hash_get_all(&keys.stats).await?;
        decode_stats(&keys.stats, &raw)
    }

    /// Counters for a broadcast.
    pub async fn stats(&self, id: BroadcastId) -> Result<BroadcastStats, DbError> {
        self.find_stats(id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Broadcast not found: {}", id)))
    }

    /// The broadcast's message payload.
    pub async fn message(&self, id: BroadcastId) -> Result<BroadcastMessage, DbError> {
        let keys = BroadcastKeys::new(id);
        let raw = self
            .store
            .get(&keys.message)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Broadcast message not found: {}", id)))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn is_active(&self, id: BroadcastId) -> Result<bool, DbError> {
        self.store.set_is_member(keys::ACTIVE, &id.to_string()).await
    }

    /// The most recent `limit` broadcast ids, newest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<BroadcastId>, DbError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let raw = self
            .store
            .list_range(keys::HISTORY, 0, limit as i64 - 1)
            .await?;
        Ok(raw
            .iter()
            .filter_map(|value| match BroadcastId::parse(value) {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!("Skipping history entry: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Broadcasts with outstanding work.
    pub async fn active_ids(&self) -> Result<Vec<BroadcastId>, DbError> {
        let mut ids: Vec<BroadcastId> = self
            .store
            .set_members(keys::ACTIVE)
            .await?
            .iter()
            .filter_map(|value| BroadcastId::parse(value).ok())
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Move one pending recipient into the processing set.
    ///
    /// The claim is scored with `now` so [`requeue_stale`](Self::requeue_stale)
    /// can find abandoned entries. Returns `None` when the queue is empty.
    pub async fn claim_next(
        &self,
        id: BroadcastId,
        now: DateTime<Utc>,
    ) -> Result<Option<RecipientId>, DbError> {
        let keys = BroadcastKeys::new(id);
        loop {
            let score = now.timestamp_millis() as f64;
            let Some(member) = self
                .store
                .list_pop_into_sorted_set(&keys.pending, &keys.processing, score)
                .await?
            else {
                return Ok(None);
            };

            self.store.hash_incr(&keys.stats, field::PENDING, -1).await?;
            self.store.hash_incr(&keys.stats, field::PROCESSING, 1).await?;

            match member.parse::<RecipientId>() {
                Ok(recipient) => return Ok(Some(recipient)),
                Err(e) => {
                    // Unusable entry: drop it from the broadcast entirely.
                    tracing::warn!(broadcast_id = %id, "Discarding queued entry: {}", e);
                    if self.store.sorted_set_remove(&keys.processing, &member).await? {
                        self.store.hash_incr(&keys.stats, field::PROCESSING, -1).await?;
                        self.store.hash_incr(&keys.stats, field::TOTAL, -1).await?;
                    }
                }
            }
        }
    }

    /// Record that a worker has started draining the broadcast.
    pub async fn mark_draining(&self, id: BroadcastId) -> Result<(), DbError> {
        self.set_state(id, BroadcastState::Draining).await
    }

    /// Take a recipient out of the processing set.
    ///
    /// Returns `false` when the entry was already gone, meaning the sweep
    /// handed it back to pending and the caller no longer owns it.
    pub async fn release(&self, id: BroadcastId, recipient: RecipientId) -> Result<bool, DbError> {
        let keys = BroadcastKeys::new(id);
        let owned = self
            .store
            .sorted_set_remove(&keys.processing, &recipient.to_string())
            .await?;
        if owned {
            self.store.hash_incr(&keys.stats, field::PROCESSING, -1).await?;
        }
        Ok(owned)
    }

    pub async fn mark_succeeded(
        &self,
        id: BroadcastId,
        recipient: RecipientId,
    ) -> Result<(), DbError> {
        let keys = BroadcastKeys::new(id);
        self.store.set_add(&keys.succeeded, &recipient.to_string()).await?;
        self.store.hash_incr(&keys.stats, field::SENT, 1).await?;
        Ok(())
    }

    /// Record a terminal failure, keeping only the latest error per recipient.
    pub async fn mark_failed(
        &self,
        id: BroadcastId,
        recipient: RecipientId,
        error: &str,
    ) -> Result<(), DbError> {
        let keys = BroadcastKeys::new(id);
        self.store
            .hash_set(&keys.failed, &[(recipient.to_string(), error.to_string())])
            .await?;
        self.store.hash_incr(&keys.stats, field::FAILED, 1).await?;
        Ok(())
    }

    /// Mark the broadcast completed if nothing is pending or processing.
    ///
    /// Returns the final counters when the broadcast is (now) complete and
    /// `None` while work is still outstanding.
    pub async fn complete(
        &self,
        id: BroadcastId,
        now: DateTime<Utc>,
    ) -> Result<Option<BroadcastStats>, DbError> {
        let keys = BroadcastKeys::new(id);
        if self.store.list_len(&keys.pending).await? > 0
            || self.store.sorted_set_len(&keys.processing).await? > 0
        {
            return Ok(None);
        }

        let raw = self.store.hash_get_all(&keys.stats).await?;
        let stored_completed = raw.get(field::STATE).map(String::as_str)
            == Some(BroadcastState::Completed.as_str());
        let stats = decode_stats(&keys.stats, &raw)?
            .ok_or_else(|| DbError::NotFound(format!("Broadcast not found: {}", id)))?;

        if !stored_completed {
            let duration = (now - stats.start_time).num_milliseconds().max(0);
            self.store
                .hash_set(
                    &keys.stats,
                    &[
                        (field::END_TIME.to_string(), now.timestamp_millis().to_string()),
                        (field::DURATION.to_string(), duration.to_string()),
                        (
                            field::STATE.to_string(),
                            BroadcastState::Completed.as_str().to_string(),
                        ),
                    ],
                )
                .await?;
        }
        self.store.set_remove(keys::ACTIVE, &id.to_string()).await?;

        let stats = self.stats(id).await?;
        if !stored_completed {
            tracing::info!(
                broadcast_id = %id,
                sent = stats.sent,
                failed = stats.failed,
                "Broadcast completed"
            );
        }
        Ok(Some(stats))
    }

    /// Recipients delivered so far, ascending.
    pub async fn succeeded_recipients(&self, id: BroadcastId) -> Result<Vec<RecipientId>, DbError> {
        let keys = BroadcastKeys::new(id);
        let raw = self.store.set_members(&keys.succeeded).await?;
        decode_recipients(&keys.succeeded, raw)
    }

    /// Move every failed recipient back to pending and reactivate the broadcast.
    ///
    /// Returns how many recipients were re-enqueued; a second call with no
    /// worker run in between returns 0.
    pub async fn retry_failed(&self, id: BroadcastId) -> Result<u64, DbError> {
        let keys = BroadcastKeys::new(id);
        if self.find_stats(id).await?.is_none() {
            return Err(DbError::NotFound(format!("Broadcast not found: {}", id)));
        }

        let failed = self.store.hash_take_all(&keys.failed).await?;
        if failed.is_empty() {
            return Ok(0);
        }

        let recipients: Vec<String> = failed.into_keys().collect();
        let count = recipients.len() as u64;
        for chunk in recipients.chunks(ENQUEUE_CHUNK) {
            self.store.list_push_front(&keys.pending, chunk).await?;
        }
        self.store
            .hash_incr(&keys.stats, field::PENDING, count as i64)
            .await?;
        self.store
            .hash_incr(&keys.stats, field::FAILED, -(count as i64))
            .await?;
        self.store.set_add(keys::ACTIVE, &id.to_string()).await?;
        self.set_state(id, BroadcastState::Draining).await?;

        tracing::info!(broadcast_id = %id, count, "Re-enqueued failed recipients");
        Ok(count)
    }

    /// Return processing entries claimed before `now - lease` to pending.
    ///
    /// Only entries this call actually removes are counted, so a concurrent
    /// release and sweep never both adjust the counters.
    pub async fn requeue_stale(
        &self,
        id: BroadcastId,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let keys = BroadcastKeys::new(id);
        let cutoff = now.timestamp_millis() as f64 - lease.as_millis() as f64;
        let stale = self
            .store
            .sorted_set_range_by_score(&keys.processing, f64::NEG_INFINITY, cutoff)
            .await?;

        let mut requeued = 0;
        for member in stale {
            if !self.store.sorted_set_remove(&keys.processing, &member).await? {
                continue;
            }
            self.store
                .list_push_front(&keys.pending, std::slice::from_ref(&member))
                .await?;
            self.store.hash_incr(&keys.stats, field::PROCESSING, -1).await?;
            self.store.hash_incr(&keys.stats, field::PENDING, 1).await?;
            requeued += 1;
        }

        if requeued > 0 {
            tracing::warn!(broadcast_id = %id, requeued, "Requeued stale processing entries");
        }
        Ok(requeued)
    }

    async fn set_state(&self, id: BroadcastId, state: BroadcastState) -> Result<(), DbError> {
        let keys = BroadcastKeys::new(id);
        self.store
            .hash_set(
                &keys.stats,
                &[(field::STATE.to_string(), state.as_str().to_string())],
            )
            .await
    }
}
