//! Read-side views: status, analytics, details and CSV export.

use broadcast_core::{
    BroadcastAnalytics, BroadcastId, BroadcastStats, BroadcastStatus, ClickRecord, ClickTiming,
    EngagementFunnel, ExportKind, FailedRecipient, RecipientId, clicks_csv, error_breakdown,
    failed_csv, success_csv,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keys::BroadcastKeys;
use crate::records::{decode_clicks, decode_failed};
use crate::repositories::BroadcastRepository;
use crate::{DbError, Store};

/// One row of the broadcast history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: BroadcastId,
    pub stats: BroadcastStats,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
}

/// Everything the operator's details view shows for one broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastDetails {
    pub broadcast_id: BroadcastId,
    pub status: BroadcastStatus,
    pub analytics: BroadcastAnalytics,
    pub succeeded: Vec<RecipientId>,
    pub failed: Vec<FailedRecipient>,
    pub clicks: Vec<ClickRecord>,
}

/// Repository computing status and analytics from recorded state.
#[derive(Clone)]
pub struct AnalyticsRepository {
    store: Store,
    broadcasts: BroadcastRepository,
}

impl AnalyticsRepository {
    pub fn new(store: Store) -> Self {
        Self {
            broadcasts: BroadcastRepository::new(store.clone()),
            store,
        }
    }

    /// Counters enriched with progress, ETA and completion as of `now`.
    pub async fn status(
        &self,
        id: BroadcastId,
        now: DateTime<Utc>,
    ) -> Result<BroadcastStatus, DbError> {
        let stats = self.broadcasts.stats(id).await?;
        Ok(BroadcastStatus::at(id, stats, now))
    }

    /// Funnel, error breakdown and click timing.
    pub async fn analytics(&self, id: BroadcastId) -> Result<BroadcastAnalytics, DbError> {
        let stats = self.broadcasts.stats(id).await?;
        let failed = self.failed(id).await?;
        let clicks = self.clicks(id).await?;
        Ok(Self::build_analytics(id, stats, &failed, &clicks))
    }

    pub async fn succeeded(&self, id: BroadcastId) -> Result<Vec<RecipientId>, DbError> {
        self.broadcasts.succeeded_recipients(id).await
    }

    /// Failed recipients with their last error, ascending by id.
    pub async fn failed(&self, id: BroadcastId) -> Result<Vec<FailedRecipient>, DbError> {
        let keys = BroadcastKeys::new(id);
        let raw = self.store.hash_get_all(&keys.failed).await?;
        decode_failed(&keys.failed, raw)
    }

    /// Latest click per recipient, oldest first.
    pub async fn clicks(&self, id: BroadcastId) -> Result<Vec<ClickRecord>, DbError> {
        let keys = BroadcastKeys::new(id);
        let raw = self.store.hash_get_all(&keys.clicks).await?;
        decode_clicks(&keys.clicks, raw)
    }

    /// Status, analytics and every per-recipient record in one view.
    pub async fn details(
        &self,
        id: BroadcastId,
        now: DateTime<Utc>,
    ) -> Result<BroadcastDetails, DbError> {
        let stats = self.broadcasts.stats(id).await?;
        let succeeded = self.succeeded(id).await?;
        let failed = self.failed(id).await?;
        let clicks = self.clicks(id).await?;

        Ok(BroadcastDetails {
            broadcast_id: id,
            status: BroadcastStatus::at(id, stats.clone(), now),
            analytics: Self::build_analytics(id, stats, &failed, &clicks),
            succeeded,
            failed,
            clicks,
        })
    }

    /// CSV rendering of one per-recipient record set.
    pub async fn export(&self, id: BroadcastId, kind: ExportKind) -> Result<String, DbError> {
        let stats = self.broadcasts.stats(id).await?;
        Ok(match kind {
            ExportKind::Success => success_csv(&self.succeeded(id).await?),
            ExportKind::Failed => failed_csv(&self.failed(id).await?),
            ExportKind::Clicks => clicks_csv(stats.start_time, &self.clicks(id).await?),
        })
    }

    /// The most recent `limit` broadcasts with their counters, newest first.
    ///
    /// Ids whose stats have disappeared are skipped.
    pub async fn history(&self, limit: usize) -> Result<Vec<HistoryEntry>, DbError> {
        let mut entries = Vec::new();
        for id in self.broadcasts.history(limit).await? {
            match self.broadcasts.find_stats(id).await? {
                Some(stats) => entries.push(HistoryEntry {
                    id,
                    stats,
                    date: id.created_at(),
                }),
                None => tracing::debug!(broadcast_id = %id, "History entry has no stats"),
            }
        }
        Ok(entries)
    }

    fn build_analytics(
        id: BroadcastId,
        stats: BroadcastStats,
        failed: &[FailedRecipient],
        clicks: &[ClickRecord],
    ) -> BroadcastAnalytics {
        BroadcastAnalytics {
            broadcast_id: id,
            funnel: EngagementFunnel::from_stats(&stats),
            error_breakdown: error_breakdown(failed.iter().map(|f| f.error.as_str())),
            click_timing: ClickTiming::from_clicks(
                stats.start_time,
                clicks.iter().map(|c| c.timestamp),
            ),
            stats,
        }
    }
}
