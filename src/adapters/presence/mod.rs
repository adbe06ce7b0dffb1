//! Presence tracking adapters.
//!
//! - `PresenceTracker` - TTL presence over a shared store with a local LRU cache
//! - `InMemoryPresenceStore` - single-node store (also used in tests)
//! - `RedisPresenceStore` - Redis store for multi-node deployments

mod cache;
mod in_memory_store;
mod redis_store;
mod tracker;

pub use cache::PresenceCache;
pub use in_memory_store::InMemoryPresenceStore;
pub use redis_store::RedisPresenceStore;
pub use tracker::{PresenceChange, PresenceSettings, PresenceTracker};
