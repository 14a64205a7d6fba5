use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag naming one cache generation, e.g. `imv-voice-v7`.
///
/// The tag doubles as the cache name. Bumping it on deploy is what
/// invalidates every older cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheVersion(String);

impl CacheVersion {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheVersion {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}
