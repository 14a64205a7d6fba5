use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one cache worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Created, nothing run yet.
    #[default]
    Parsed,
    /// Pre-populating the cache.
    Installing,
    /// Installed and waiting to take over.
    Installed,
    /// Purging stale caches.
    Activating,
    /// Serving requests.
    Activated,
    /// Superseded or failed; never serves again.
    Redundant,
}

impl WorkerState {
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        match (self, next) {
            (Redundant, _) => false,
            (_, Redundant) => true,
            (Parsed | Installed, Installing) => true,
            (Installing, Installed) => true,
            (Installed, Activating) => true,
            (Activating, Activated) => true,
            _ => false,
        }
    }

    pub fn is_waiting(self) -> bool {
        self == WorkerState::Installed
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}
