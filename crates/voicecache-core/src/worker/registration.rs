use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use super::{normalize_scope, CacheWorker, FetchOutcome, InstallReport, WorkerError};
use crate::models::{CacheVersion, ControlMessage, Request};

/// Tracks the worker versions deployed for one scope.
///
/// At most one version is active at a time. A newly installed version waits
/// until it asks to skip waiting, either on its own after install or when a
/// `SKIP_WAITING` message arrives.
pub struct Registration {
    scope: Url,
    active: RwLock<Option<Arc<CacheWorker>>>,
    waiting: RwLock<Option<Arc<CacheWorker>>>,
}

impl Registration {
    pub fn new(scope: Url) -> Self {
        Self {
            scope: normalize_scope(scope),
            active: RwLock::new(None),
            waiting: RwLock::new(None),
        }
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub async fn active(&self) -> Option<Arc<CacheWorker>> {
        self.active.read().await.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<CacheWorker>> {
        self.waiting.read().await.clone()
    }

    pub async fn active_version(&self) -> Option<CacheVersion> {
        self.active().await.map(|w| w.version().clone())
    }

    /// Install a new version. It replaces any version already waiting and
    /// is activated right away if it requested skip-waiting.
    pub async fn update(&self, worker: CacheWorker) -> Result<InstallReport, WorkerError> {
        if worker.scope() != &self.scope {
            return Err(WorkerError::ScopeMismatch {
                worker: worker.scope().to_string(),
                registration: self.scope.to_string(),
            });
        }

        let worker = Arc::new(worker);
        let report = worker.install().await?;

        let replaced = self.waiting.write().await.replace(Arc::clone(&worker));
        if let Some(old) = replaced {
            debug!(version = %old.version(), "Waiting version replaced");
            old.retire();
        }

        if worker.skip_waiting_requested() {
            self.promote().await?;
        } else {
            info!(version = %worker.version(), "Installed, waiting to activate");
        }
        Ok(report)
    }

    /// Deliver a control message to the waiting version. Returns whether the
    /// message caused it to activate.
    pub async fn post_message(&self, message: &ControlMessage) -> Result<bool, WorkerError> {
        let Some(waiting) = self.waiting().await else {
            debug!(kind = ?message.kind, "No waiting version, message ignored");
            return Ok(false);
        };

        if !waiting.handle_message(message) {
            return Ok(false);
        }
        self.promote().await?;
        Ok(true)
    }

    /// Route a request to the active version. Without one, nothing is
    /// intercepted.
    pub async fn handle_fetch(&self, request: Request) -> FetchOutcome {
        match self.active().await {
            Some(worker) => worker.handle_fetch(request).await,
            None => FetchOutcome::Passthrough(request),
        }
    }

    /// Activate the waiting version and retire the previous one. If
    /// activation fails the previous version stays active.
    async fn promote(&self) -> Result<(), WorkerError> {
        let Some(next) = self.waiting.write().await.take() else {
            return Ok(());
        };

        next.activate().await?;

        let previous = self.active.write().await.replace(Arc::clone(&next));
        if let Some(previous) = previous {
            previous.retire();
        }
        info!(version = %next.version(), "Version is now active");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStorage;
    use crate::models::Response;
    use crate::testing::ScriptedFetcher;
    use crate::worker::{ResponseSource, WorkerContext, WorkerSettings, WorkerState};

    const SCOPE: &str = "https://voice.example/";

    fn context() -> WorkerContext {
        let fetcher = ScriptedFetcher::new()
            .respond("https://voice.example/index.html", Response::new(200, "<html>"));
        let (ctx, _events) = WorkerContext::new(Arc::new(CacheStorage::in_memory()), Arc::new(fetcher));
        ctx
    }

    fn worker(ctx: &WorkerContext, version: &str, auto_activate: bool) -> CacheWorker {
        let settings = WorkerSettings::new(version.into(), Url::parse(SCOPE).unwrap())
            .with_assets(["./index.html"])
            .with_auto_activate(auto_activate);
        CacheWorker::new(settings, ctx.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_first_update_activates() {
        let ctx = context();
        let registration = Registration::new(Url::parse(SCOPE).unwrap());

        let report = registration.update(worker(&ctx, "v1", true)).await.unwrap();
        assert_eq!(report.cached, vec!["https://voice.example/index.html"]);
        assert_eq!(registration.active_version().await, Some("v1".into()));
        assert!(registration.waiting().await.is_none());
    }

    #[tokio::test]
    async fn test_new_version_supersedes_old() {
        let ctx = context();
        let registration = Registration::new(Url::parse(SCOPE).unwrap());
        registration.update(worker(&ctx, "v1", true)).await.unwrap();
        let v1 = registration.active().await.unwrap();

        registration.update(worker(&ctx, "v2", true)).await.unwrap();

        assert_eq!(registration.active_version().await, Some("v2".into()));
        assert_eq!(v1.state(), WorkerState::Redundant);
        assert_eq!(ctx.storage.keys().await, vec!["v2"]);
    }

    #[tokio::test]
    async fn test_waiting_version_activates_on_message() {
        let ctx = context();
        let registration = Registration::new(Url::parse(SCOPE).unwrap());
        registration.update(worker(&ctx, "v1", true)).await.unwrap();
        registration.update(worker(&ctx, "v2", false)).await.unwrap();

        // Old cache stays until the new version takes over
        assert_eq!(registration.active_version().await, Some("v1".into()));
        assert_eq!(ctx.storage.keys().await, vec!["v1", "v2"]);

        let ignored = registration
            .post_message(&ControlMessage::new("CHECK_UPDATE"))
            .await
            .unwrap();
        assert!(!ignored);
        assert!(registration.waiting().await.is_some());

        let activated = registration
            .post_message(&ControlMessage::skip_waiting())
            .await
            .unwrap();
        assert!(activated);
        assert_eq!(registration.active_version().await, Some("v2".into()));
        assert_eq!(ctx.storage.keys().await, vec!["v2"]);
    }

    #[tokio::test]
    async fn test_newer_waiting_version_replaces_older() {
        let ctx = context();
        let registration = Registration::new(Url::parse(SCOPE).unwrap());
        registration.update(worker(&ctx, "v2", false)).await.unwrap();
        let v2 = registration.waiting().await.unwrap();

        registration.update(worker(&ctx, "v3", false)).await.unwrap();

        assert_eq!(v2.state(), WorkerState::Redundant);
        assert_eq!(registration.waiting().await.unwrap().version(), &CacheVersion::from("v3"));
    }

    #[tokio::test]
    async fn test_message_without_waiting_version() {
        let registration = Registration::new(Url::parse(SCOPE).unwrap());
        let handled = registration
            .post_message(&ControlMessage::skip_waiting())
            .await
            .unwrap();
        assert!(!handled);
    }

    #[tokio::test]
    async fn test_fetch_routes_to_active_version() {
        let ctx = context();
        let registration = Registration::new(Url::parse(SCOPE).unwrap());
        let index = Request::get(Url::parse("https://voice.example/index.html").unwrap());

        assert!(matches!(
            registration.handle_fetch(index.clone()).await,
            FetchOutcome::Passthrough(_)
        ));

        registration.update(worker(&ctx, "v1", true)).await.unwrap();
        let outcome = registration.handle_fetch(index).await;
        assert_eq!(outcome.source(), Some(ResponseSource::Cache));
        assert_eq!(outcome.response().unwrap().body, b"<html>");
    }

    #[tokio::test]
    async fn test_scope_mismatch() {
        let ctx = context();
        let registration = Registration::new(Url::parse("https://voice.example/other/").unwrap());

        let err = registration.update(worker(&ctx, "v1", true)).await.unwrap_err();
        assert!(matches!(err, WorkerError::ScopeMismatch { .. }));
    }
}
