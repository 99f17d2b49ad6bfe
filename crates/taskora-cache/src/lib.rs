//! # Taskora Cache
//!
//! Redis-backed cache layer for todo and tag queries.
//!
//! The layer answers a read-heavy, per-user list workload that must
//! stay coherent with the relational system of record under concurrent
//! mutation:
//!
//! - **Point records** cache single todos as Redis hashes.
//! - **Ordered indexes** answer a fixed set of (filter, order) list
//!   shapes per user from sorted sets, rebuilt lazily from the store.
//! - **Result blobs** answer every other list shape under a
//!   fingerprinted key.
//! - A per-user **lease** serialises writers of one user's keyspace,
//!   and per-key **request coalescing** collapses concurrent loads of
//!   the same key to a single store round-trip.
//!
//! Reads degrade to the store when Redis is unreachable; writes go to
//! the store first and never fail the caller on cache trouble.

pub mod config;
pub mod flight;
pub mod keys;
pub mod lock;
pub mod pool;
pub mod record;
pub mod score;
mod sweep;
pub mod tag_cache;
pub mod todo_cache;

pub use config::{CacheConfig, RedisConfig};
pub use flight::Flight;
pub use lock::{with_locks, RedisLock};
pub use pool::create_pool;
pub use tag_cache::TagCache;
pub use todo_cache::TodoCache;
