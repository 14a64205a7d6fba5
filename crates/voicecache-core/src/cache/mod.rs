//! Versioned response caches for offline access.
//!
//! This module provides `CacheStorage`, the origin-scoped set of named
//! caches, and `Cache`, a single request → response map. A storage can live
//! purely in memory or be backed by a directory, in which case each cache is
//! written as `<name>.json` and reloaded on the next start.
//!
//! Cache names are version tags. Activating a new version deletes every
//! cache whose name differs from the current tag.

pub mod entry;
pub mod error;
pub mod storage;
pub mod store;

pub use entry::CacheEntry;
pub use error::CacheError;
pub use storage::CacheStorage;
pub use store::Cache;
