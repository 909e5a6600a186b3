//! # recordstore
//!
//! Authoritative record store for the cache-aside layer.
//!
//! ## Contents
//! - **Record**: identifier plus a map of mutable attributes
//! - **RecordStore**: async get-by-id / replace-by-id interface
//! - **MemoryStore**: in-process adapter behind a single reader/writer lock

#![warn(missing_docs)]

mod error;
mod memory;
mod record;
mod store;

pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use record::{Record, RecordId};
pub use store::RecordStore;
