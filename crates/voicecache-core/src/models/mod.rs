//! Data models for the offline cache.
//!
//! This module contains the plain data types that flow between the cache,
//! the network fetcher and the worker:
//!
//! - `Request`, `RequestKey`: what is being fetched and how it is keyed
//! - `Response`, `ResponseType`: what came back, and from which origin class
//! - `ControlMessage`, `Command`: out-of-band messages sent to a worker
//! - `CacheVersion`: the tag naming one cache generation

pub mod message;
pub mod request;
pub mod response;
pub mod version;

pub use message::{Command, ControlMessage, SKIP_WAITING};
pub use request::{Request, RequestKey};
pub use response::{Response, ResponseType};
pub use version::CacheVersion;
