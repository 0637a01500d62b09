#![allow(dead_code)]

use std::sync::Arc;

use broadcast_core::{BroadcastId, BroadcastMessage, RecipientId};
use db::repositories::{AnalyticsRepository, BroadcastRepository, ClickRepository};
use db::{DbError, MemoryStore, Store};

pub struct Repos {
    pub store: Store,
    pub broadcasts: BroadcastRepository,
    pub analytics: AnalyticsRepository,
    pub clicks: ClickRepository,
}

/// Fresh repositories over an isolated in-memory store.
pub fn setup() -> Repos {
    let store: Store = Arc::new(MemoryStore::new());
    Repos {
        broadcasts: BroadcastRepository::new(store.clone()),
        analytics: AnalyticsRepository::new(store.clone()),
        clicks: ClickRepository::new(store.clone()),
        store,
    }
}

pub fn message() -> BroadcastMessage {
    BroadcastMessage::new("T", "B", "https://x")
}

pub fn fids(ids: &[u64]) -> Vec<RecipientId> {
    ids.iter().copied().map(RecipientId).collect()
}

/// Claim and settle every pending recipient; `fail` decides who fails.
pub async fn drain(
    repos: &Repos,
    id: BroadcastId,
    fail: impl Fn(RecipientId) -> Option<&'static str>,
) -> Result<(), DbError> {
    while let Some(recipient) = repos.broadcasts.claim_next(id, chrono::Utc::now()).await? {
        assert!(repos.broadcasts.release(id, recipient).await?);
        match fail(recipient) {
            Some(error) => repos.broadcasts.mark_failed(id, recipient, error).await?,
            None => repos.broadcasts.mark_succeeded(id, recipient).await?,
        }
    }
    repos.broadcasts.complete(id, chrono::Utc::now()).await?;
    Ok(())
}
