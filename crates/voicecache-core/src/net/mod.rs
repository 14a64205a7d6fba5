//! Network access for the worker.
//!
//! The worker never talks to `reqwest` directly. It goes through the
//! `Fetcher` trait so the same cache policy runs against a real origin
//! (`HttpFetcher`) or a scripted one in tests.

pub mod error;
pub mod fetcher;

pub use error::FetchError;
pub use fetcher::{Fetcher, HttpFetcher};
