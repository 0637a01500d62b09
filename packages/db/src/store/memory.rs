//! In-memory store backend for tests and single-process deployments.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::KvStore;
use crate::DbError;

#[derive(Debug)]
enum Entry {
    Str {
        value: String,
        expires_at: Option<Instant>,
    },
    List(VecDeque<String>),
    Set(HashSet<String>),
    Hash(HashMap<String, String>),
    SortedSet(HashMap<String, f64>),
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Entry::Str { expires_at: Some(at), .. } if *at <= now)
    }

    fn is_empty(&self) -> bool {
        match self {
            Entry::Str { .. } => false,
            Entry::List(list) => list.is_empty(),
            Entry::Set(set) => set.is_empty(),
            Entry::Hash(hash) => hash.is_empty(),
            Entry::SortedSet(zset) => zset.is_empty(),
        }
    }
}

/// A [`KvStore`] held in process memory.
///
/// One mutex guards the whole keyspace, so every operation is atomic with
/// respect to every other. Empty collections are removed, matching Redis.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

macro_rules! typed {
    ($entries:expr, $key:expr, $variant:ident, $init:expr) => {{
        let entry = $entries
            .entry($key.to_string())
            .or_insert_with(|| Entry::$variant($init));
        match entry {
            Entry::$variant(inner) => inner,
            _ => return Err(DbError::WrongType($key.to_string())),
        }
    }};
}

macro_rules! typed_ref {
    ($entries:expr, $key:expr, $variant:ident) => {{
        match $entries.get($key) {
            None => None,
            Some(Entry::$variant(inner)) => Some(inner),
            Some(_) => return Err(DbError::WrongType($key.to_string())),
        }
    }};
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(entries: &mut HashMap<String, Entry>, key: &str) {
        if entries.get(key).is_some_and(Entry::is_empty) {
            entries.remove(key);
        }
    }
}

/// Resolve a Redis-style inclusive index range against `len`.
fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn list_push_front(&self, key: &str, values: &[String]) -> Result<u64, DbError> {
        let mut entries = self.entries.lock().await;
        let list = typed!(entries, key, List, VecDeque::new());
        for value in values {
            list.push_front(value.clone());
        }
        let len = list.len() as u64;
        Self::prune(&mut entries, key);
        Ok(len)
    }

    async fn list_pop_into_sorted_set(
        &self,
        list_key: &str,
        zset_key: &str,
        score: f64,
    ) -> Result<Option<String>, DbError> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(zset_key) {
            if !matches!(entry, Entry::SortedSet(_)) {
                return Err(DbError::WrongType(zset_key.to_string()));
            }
        }

        let popped = match entries.get_mut(list_key) {
            None => None,
            Some(Entry::List(list)) => list.pop_back(),
            Some(_) => return Err(DbError::WrongType(list_key.to_string())),
        };
        Self::prune(&mut entries, list_key);

        if let Some(member) = &popped {
            let zset = typed!(entries, zset_key, SortedSet, HashMap::new());
            zset.insert(member.clone(), score);
        }
        Ok(popped)
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, DbError> {
        let entries = self.entries.lock().await;
        let Some(list) = typed_ref!(entries, key, List) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn list_len(&self, key: &str) -> Result<u64, DbError> {
        let entries = self.entries.lock().await;
        Ok(typed_ref!(entries, key, List).map_or(0, |list| list.len() as u64))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, DbError> {
        let mut entries = self.entries.lock().await;
        let set = typed!(entries, key, Set, HashSet::new());
        Ok(set.insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, DbError> {
        let mut entries = self.entries.lock().await;
        let removed = match entries.get_mut(key) {
            None => false,
            Some(Entry::Set(set)) => set.remove(member),
            Some(_) => return Err(DbError::WrongType(key.to_string())),
        };
        Self::prune(&mut entries, key);
        Ok(removed)
    }

    async fn set_is_member(&self, key: &str, member: &str) -> Result<bool, DbError> {
        let entries = self.entries.lock().await;
        Ok(typed_ref!(entries, key, Set).is_some_and(|set| set.contains(member)))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, DbError> {
        let entries = self.entries.lock().await;
        Ok(typed_ref!(entries, key, Set)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_len(&self, key: &str) -> Result<u64, DbError> {
        let entries = self.entries.lock().await;
        Ok(typed_ref!(entries, key, Set).map_or(0, |set| set.len() as u64))
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), DbError> {
        let mut entries = self.entries.lock().await;
        let hash = typed!(entries, key, Hash, HashMap::new());
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Self::prune(&mut entries, key);
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, DbError> {
        let entries = self.entries.lock().await;
        Ok(typed_ref!(entries, key, Hash).cloned().unwrap_or_default())
    }

    async fn hash_take_all(&self, key: &str) -> Result<HashMap<String, String>, DbError> {
        let mut entries = self.entries.lock().await;
        match entries.remove(key) {
            None => Ok(HashMap::new()),
            Some(Entry::Hash(hash)) => Ok(hash),
            Some(other) => {
                entries.insert(key.to_string(), other);
                Err(DbError::WrongType(key.to_string()))
            }
        }
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, DbError> {
        let mut entries = self.entries.lock().await;
        let hash = typed!(entries, key, Hash, HashMap::new());
        let current = match hash.get(field) {
            None => 0,
            Some(raw) => raw.parse::<i64>().map_err(|_| DbError::NotAnInteger {
                key: key.to_string(),
                field: field.to_string(),
            })?,
        };
        let next = current + delta;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, DbError> {
        let mut entries = self.entries.lock().await;
        let removed = match entries.get_mut(key) {
            None => false,
            Some(Entry::SortedSet(zset)) => zset.remove(member).is_some(),
            Some(_) => return Err(DbError::WrongType(key.to_string())),
        };
        Self::prune(&mut entries, key);
        Ok(removed)
    }

    async fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<String>, DbError> {
        let entries = self.entries.lock().await;
        let Some(zset) = typed_ref!(entries, key, SortedSet) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<(&String, f64)> = zset
            .iter()
            .filter(|(_, score)| **score >= min && **score <= max)
            .map(|(member, score)| (member, *score))
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        Ok(hits.into_iter().map(|(member, _)| member.clone()).collect())
    }

    async fn sorted_set_len(&self, key: &str) -> Result<u64, DbError> {
        let entries = self.entries.lock().await;
        Ok(typed_ref!(entries, key, SortedSet).map_or(0, |zset| zset.len() as u64))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DbError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry::Str {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        let mut entries = self.entries.lock().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(Instant::now()))
        {
            entries.remove(key);
            return Ok(None);
        }
        match entries.get(key) {
            None => Ok(None),
            Some(Entry::Str { value, .. }) => Ok(Some(value.clone())),
            Some(_) => Err(DbError::WrongType(key.to_string())),
        }
    }
}
