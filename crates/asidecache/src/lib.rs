//! # asidecache
//!
//! Cache-aside policy engine in front of an authoritative record store.
//!
//! ## Architecture
//! - **Read path**: cache lookup, hit counting, TTL renewal for popular
//!   entries, store fallback and fill on miss
//! - **Write path**: store replace, then delete the entry and its counter
//! - **Sweeper**: periodic scan that deletes keys with no TTL or none left
//! - **Backends**: Redis for production, an in-process map for tests
//!
//! Cache failures never reach callers; reads degrade to the store.

#![warn(missing_docs)]

mod backend;
mod cache;
mod config;
mod error;
mod keys;
mod memory;
mod redis_backend;
mod stats;
mod sweeper;

pub use backend::{CacheBackend, CacheError, CacheResult, KeyTtl, ScanPage, SCAN_START};
pub use cache::AsideCache;
pub use config::{CacheConfig, MAX_BACKEND_TIMEOUT, MAX_ENTRY_TTL, MAX_SWEEP_INTERVAL};
pub use error::{Error, Result};
pub use keys::KeySpace;
pub use memory::{BackendOp, Fault, MemoryBackend};
pub use redis_backend::RedisBackend;
pub use stats::{CacheStats, StatsSnapshot};
pub use sweeper::{SweepReport, Sweeper, SweeperHandle};
