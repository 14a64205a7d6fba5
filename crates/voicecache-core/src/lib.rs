//! Core library for voicecache.
//!
//! Keeps a static site usable offline: one versioned cache of its assets,
//! served cache-first while refreshing from the network in the background.
//! Bumping the version tag on deploy installs a new cache generation and
//! purges the old ones when it activates.

pub mod cache;
pub mod config;
pub mod models;
pub mod net;
pub mod worker;

#[cfg(test)]
mod testing;

pub use cache::{Cache, CacheEntry, CacheError, CacheStorage};
pub use config::Config;
pub use models::{CacheVersion, ControlMessage, Request, RequestKey, Response, ResponseType};
pub use net::{FetchError, Fetcher, HttpFetcher};
pub use worker::{
    CacheWorker, FetchOutcome, InstallReport, Registration, ResponseSource, WorkerContext,
    WorkerError, WorkerEvent, WorkerSettings, WorkerState,
};
