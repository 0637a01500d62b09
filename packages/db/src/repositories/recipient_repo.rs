//! Directory of known recipients, used when a broadcast targets everyone.

use broadcast_core::RecipientId;

use crate::keys;
use crate::records::decode_recipients;
use crate::{DbError, Store};

/// Repository for the recipient directory.
#[derive(Clone)]
pub struct RecipientRepository {
    store: Store,
}

impl RecipientRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Every known recipient, ascending.
    pub async fn all(&self) -> Result<Vec<RecipientId>, DbError> {
        let raw = self.store.set_members(keys::RECIPIENTS).await?;
        decode_recipients(keys::RECIPIENTS, raw)
    }

    /// Add a recipient. Returns whether it was new.
    pub async fn register(&self, recipient: RecipientId) -> Result<bool, DbError> {
        self.store
            .set_add(keys::RECIPIENTS, &recipient.to_string())
            .await
    }

    pub async fn count(&self) -> Result<u64, DbError> {
        self.store.set_len(keys::RECIPIENTS).await
    }
}
