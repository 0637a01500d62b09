//! Redis store backend.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use super::KvStore;
use crate::DbError;

/// Pop the pending tail and record it as processing in one round trip.
static CLAIM: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local member = redis.call('RPOP', KEYS[1])
if member then
    redis.call('ZADD', KEYS[2], ARGV[1], member)
end
return member
",
    )
});

/// A [`KvStore`] backed by a Redis server.
///
/// Holds a [`ConnectionManager`], which reconnects on failure and is cheap to
/// clone per operation.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn list_push_front(&self, key: &str, values: &[String]) -> Result<u64, DbError> {
        let mut conn = self.conn();
        if values.is_empty() {
            return Ok(conn.llen(key).await?);
        }
        Ok(conn.lpush(key, values).await?)
    }

    async fn list_pop_into_sorted_set(
        &self,
        list_key: &str,
        zset_key: &str,
        score: f64,
    ) -> Result<Option<String>, DbError> {
        let mut conn = self.conn();
        let claimed: Option<String> = CLAIM
            .key(list_key)
            .key(zset_key)
            .arg(score)
            .invoke_async(&mut conn)
            .await?;
        Ok(claimed)
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, DbError> {
        let mut conn = self.conn();
        Ok(conn.lrange(key, start as isize, stop as isize).await?)
    }

    async fn list_len(&self, key: &str) -> Result<u64, DbError> {
        let mut conn = self.conn();
        Ok(conn.llen(key).await?)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, DbError> {
        let mut conn = self.conn();
        let added: u64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, DbError> {
        let mut conn = self.conn();
        let removed: u64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool, DbError> {
        let mut conn = self.conn();
        Ok(conn.sismember(key, member).await?)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, DbError> {
        let mut conn = self.conn();
        Ok(conn.smembers(key).await?)
    }

    async fn set_len(&self, key: &str) -> Result<u64, DbError> {
        let mut conn = self.conn();
        Ok(conn.scard(key).await?)
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), DbError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let _: () = conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, DbError> {
        let mut conn = self.conn();
        Ok(conn.hgetall(key).await?)
    }

    async fn hash_take_all(&self, key: &str) -> Result<HashMap<String, String>, DbError> {
        let mut conn = self.conn();
        let (fields,): (HashMap<String, String>,) = redis::pipe()
            .atomic()
            .hgetall(key)
            .del(key)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(fields)
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, DbError> {
        let mut conn = self.conn();
        Ok(conn.hincr(key, field, delta).await?)
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, DbError> {
        let mut conn = self.conn();
        let removed: u64 = conn.zrem(key, member).await?;
        Ok(removed > 0)
    }

    async fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<String>, DbError> {
        let mut conn = self.conn();
        Ok(conn.zrangebyscore(key, min, max).await?)
    }

    async fn sorted_set_len(&self, key: &str) -> Result<u64, DbError> {
        let mut conn = self.conn();
        Ok(conn.zcard(key).await?)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DbError> {
        let mut conn = self.conn();
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        let mut conn = self.conn();
        Ok(conn.get(key).await?)
    }
}
