use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::trace;

use super::{Clients, WorkerEvent};
use crate::cache::CacheStorage;
use crate::net::Fetcher;

/// Shared environment every worker version runs in: the origin's caches,
/// the network, the open clients and the event channel.
/// Clone is cheap; all fields are reference counted.
#[derive(Clone)]
pub struct WorkerContext {
    pub storage: Arc<CacheStorage>,
    pub fetcher: Arc<dyn Fetcher>,
    pub clients: Arc<RwLock<Clients>>,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerContext {
    pub fn new(
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                storage,
                fetcher,
                clients: Arc::new(RwLock::new(Clients::new())),
                events,
            },
            rx,
        )
    }

    pub(crate) fn emit(&self, event: WorkerEvent) {
        if self.events.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }
}
