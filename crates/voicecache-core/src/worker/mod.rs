//! Cache worker lifecycle.
//!
//! This module provides:
//! - `CacheWorker`: one cache generation (install, activate, fetch, message)
//! - `Registration`: keeps at most one active and one waiting version
//! - `Clients`: the open views a version controls
//! - `WorkerEvent`: progress notifications, delivered over a channel
//!
//! State machine: `parsed → installing → installed → activating → activated`,
//! with `redundant` for versions that failed or were superseded.

pub mod cache_worker;
pub mod clients;
pub mod context;
pub mod error;
pub mod events;
pub mod registration;
pub mod state;

pub use cache_worker::{
    normalize_scope, CacheWorker, FetchOutcome, InstallReport, ResponseSource, WorkerSettings,
};
pub use clients::{Client, Clients};
pub use context::WorkerContext;
pub use error::WorkerError;
pub use events::WorkerEvent;
pub use registration::Registration;
pub use state::WorkerState;
