//! The key-value store contract the broadcast pipeline runs on.
//!
//! Every method is a single atomic operation against the store. Callers
//! never rely on multi-step transactions; counters are kept consistent with
//! atomic increments alone.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::DbError;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Operations the pipeline needs from its backing store.
///
/// Lists behave like Redis lists (head = index 0), sets hold unique strings,
/// hashes map string fields to string values and sorted sets order members by
/// an `f64` score.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Prepend `values` to a list in order; returns the new length.
    async fn list_push_front(&self, key: &str, values: &[String]) -> Result<u64, DbError>;

    /// Atomically pop the tail of `list_key` and add it to `zset_key` with `score`.
    async fn list_pop_into_sorted_set(
        &self,
        list_key: &str,
        zset_key: &str,
        score: f64,
    ) -> Result<Option<String>, DbError>;

    /// Elements between `start` and `stop` inclusive; negative indexes count from the tail.
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, DbError>;

    async fn list_len(&self, key: &str) -> Result<u64, DbError>;

    /// Returns whether the member was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, DbError>;

    /// Returns whether the member was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, DbError>;

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool, DbError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, DbError>;

    async fn set_len(&self, key: &str) -> Result<u64, DbError>;

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), DbError>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, DbError>;

    /// Atomically read every field of a hash and delete it.
    async fn hash_take_all(&self, key: &str) -> Result<HashMap<String, String>, DbError>;

    /// Atomically add `delta` to an integer field (missing fields start at 0).
    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, DbError>;

    /// Returns whether the member was present.
    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, DbError>;

    /// Members with `min <= score <= max`, lowest score first.
    async fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<String>, DbError>;

    async fn sorted_set_len(&self, key: &str) -> Result<u64, DbError>;

    /// Store a string value that expires after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DbError>;

    async fn get(&self, key: &str) -> Result<Option<String>, DbError>;
}
