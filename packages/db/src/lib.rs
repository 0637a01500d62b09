//! Durable queue store for the broadcast pipeline.
//!
//! This crate provides the store contract, its backends and the
//! repositories that read and mutate broadcast state.
//!
//! # Features
//!
//! - `redis` (default): Redis backend selected by `redis://` endpoints.
//!   The in-memory backend is always available.

mod connection;
pub mod keys;
mod records;
pub mod repositories;
pub mod store;

pub use connection::{DbError, Store, StoreConfig, connect};
pub use store::{KvStore, MemoryStore};

#[cfg(feature = "redis")]
pub use store::RedisStore;
