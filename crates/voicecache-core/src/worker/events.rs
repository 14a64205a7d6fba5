use crate::models::{CacheVersion, RequestKey, ResponseType};

use super::WorkerState;

/// Notifications published by workers while they run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    StateChange {
        version: CacheVersion,
        state: WorkerState,
    },
    Installed {
        version: CacheVersion,
        cached: usize,
        failed: usize,
    },
    CachesPurged {
        version: CacheVersion,
        deleted: Vec<String>,
    },
    ControllerChange {
        client_id: String,
        version: CacheVersion,
    },
    /// A background refresh stored a fresh copy.
    CacheRefreshed { key: RequestKey },
    /// The network answered but the response was not stored: it was not
    /// cacheable, or its cache had been deleted.
    RefreshSkipped {
        key: RequestKey,
        status: u16,
        response_type: ResponseType,
    },
    /// The network fetch or the cache write failed.
    RefreshFailed { key: RequestKey, error: String },
}

impl WorkerEvent {
    /// Key of the request whose background refresh this event concludes.
    pub fn refresh_key(&self) -> Option<&RequestKey> {
        match self {
            WorkerEvent::CacheRefreshed { key }
            | WorkerEvent::RefreshSkipped { key, .. }
            | WorkerEvent::RefreshFailed { key, .. } => Some(key),
            _ => None,
        }
    }
}
