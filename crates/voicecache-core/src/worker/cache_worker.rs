//! One version of the offline cache worker.
//!
//! A `CacheWorker` owns the lifecycle of a single cache generation:
//!
//! - **install**: pre-populate the cache named by the version tag from the
//!   asset manifest, best-effort
//! - **activate**: delete every other cache and claim all open clients
//! - **fetch**: serve same-origin GETs cache-first while refreshing the
//!   cache from the network in the background
//! - **message**: `SKIP_WAITING` lets a waiting version take over

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use super::{WorkerContext, WorkerError, WorkerEvent, WorkerState};
use crate::cache::Cache;
use crate::models::{CacheVersion, Command, ControlMessage, Request, Response};

/// What a worker version needs to know about its deployment.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub version: CacheVersion,
    pub scope: Url,
    /// Manifest paths, relative to `scope`.
    pub assets: Vec<String>,
    /// Request skip-waiting as soon as install finishes.
    pub auto_activate: bool,
}

impl WorkerSettings {
    pub fn new(version: CacheVersion, scope: Url) -> Self {
        Self {
            version,
            scope: normalize_scope(scope),
            assets: Vec::new(),
            auto_activate: true,
        }
    }

    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets = assets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auto_activate(mut self, auto_activate: bool) -> Self {
        self.auto_activate = auto_activate;
        self
    }
}

/// A scope is a directory. Without the trailing slash `./a.js` would
/// resolve beside the scope instead of inside it.
pub fn normalize_scope(mut scope: Url) -> Url {
    if !scope.path().ends_with('/') {
        let path = format!("{}/", scope.path());
        scope.set_path(&path);
    }
    scope.set_query(None);
    scope.set_fragment(None);
    scope
}

/// Outcome of pre-populating the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Neither answered; a 504 placeholder was synthesized.
    Fallback,
}

/// Result of offering a request to a worker.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the caller should use the network directly.
    Passthrough(Request),
    Respond {
        response: Response,
        source: ResponseSource,
    },
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond { response, .. } => Some(response),
            FetchOutcome::Passthrough(_) => None,
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::Respond { source, .. } => Some(*source),
            FetchOutcome::Passthrough(_) => None,
        }
    }
}

pub struct CacheWorker {
    version: CacheVersion,
    scope: Url,
    assets: Vec<Url>,
    auto_activate: bool,
    ctx: WorkerContext,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
}

impl CacheWorker {
    pub fn new(settings: WorkerSettings, ctx: WorkerContext) -> Result<Self, WorkerError> {
        let scope = settings.scope;
        if scope.cannot_be_a_base() || !matches!(scope.scheme(), "http" | "https") {
            return Err(WorkerError::InvalidScope(scope.to_string()));
        }

        let assets = settings
            .assets
            .iter()
            .map(|path| {
                scope.join(path).map_err(|source| WorkerError::InvalidAsset {
                    path: path.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            version: settings.version,
            scope,
            assets,
            auto_activate: settings.auto_activate,
            ctx,
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        })
    }

    pub fn version(&self) -> &CacheVersion {
        &self.version
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn assets(&self) -> &[Url] {
        &self.assets
    }

    pub fn state(&self) -> WorkerState {
        *self.lock_state()
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    // ===== Install =====

    /// Pre-populate the cache from the manifest. Individual asset failures
    /// are recorded in the report and never fail the install.
    #[instrument(skip(self), fields(version = %self.version))]
    pub async fn install(&self) -> Result<InstallReport, WorkerError> {
        self.transition(WorkerState::Installing)?;

        let report = match self.populate().await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Install failed");
                self.retire();
                return Err(e);
            }
        };

        self.transition(WorkerState::Installed)?;
        info!(
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Install complete"
        );
        self.ctx.emit(WorkerEvent::Installed {
            version: self.version.clone(),
            cached: report.cached.len(),
            failed: report.failed.len(),
        });

        if self.auto_activate {
            self.skip_waiting();
        }
        Ok(report)
    }

    async fn populate(&self) -> Result<InstallReport, WorkerError> {
        let cache = self.ctx.storage.open(self.version.as_str()).await?;

        let fetches = self.assets.iter().map(|url| {
            let request = Request::get(url.clone());
            async move {
                let result = self.ctx.fetcher.fetch(&request).await;
                (request, result)
            }
        });

        let mut report = InstallReport::default();
        let mut fetched = Vec::new();
        for (request, result) in join_all(fetches).await {
            let reason = match result {
                Ok(response) if response.is_ok() => {
                    fetched.push((request, response));
                    continue;
                }
                Ok(response) => format!("status {}", response.status),
                Err(e) => e.to_string(),
            };
            debug!(url = %request.url, reason = %reason, "Asset not cached");
            report.failed.push(request.url.to_string());
        }

        let urls: Vec<String> = fetched.iter().map(|(request, _)| request.url.to_string()).collect();
        match cache.put_all(fetched).await {
            Ok(()) => report.cached = urls,
            Err(e) => {
                warn!(error = %e, "Failed to store installed assets");
                report.failed.extend(urls);
            }
        }
        Ok(report)
    }

    // ===== Messages =====

    /// Allow this version to activate without waiting for old clients.
    pub fn skip_waiting(&self) {
        if !self.skip_waiting.swap(true, Ordering::SeqCst) {
            debug!(version = %self.version, "Skip waiting requested");
        }
    }

    /// Handle a control message. Returns whether it was recognized.
    pub fn handle_message(&self, message: &ControlMessage) -> bool {
        match message.command() {
            Some(Command::SkipWaiting) => {
                self.skip_waiting();
                true
            }
            None => {
                debug!(kind = ?message.kind, "Ignoring unrecognized message");
                false
            }
        }
    }

    // ===== Activate =====

    /// Delete every cache but this version's and claim all clients.
    /// Returns the deleted cache names. Running it again on an active
    /// worker purges whatever appeared since, without changing state.
    #[instrument(skip(self), fields(version = %self.version))]
    pub async fn activate(&self) -> Result<Vec<String>, WorkerError> {
        if self.state() == WorkerState::Activated {
            return Ok(self.ctx.storage.retain_only(self.version.as_str()).await?);
        }

        self.transition(WorkerState::Activating)?;

        let deleted = match self.ctx.storage.retain_only(self.version.as_str()).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(error = %e, "Failed to purge stale caches");
                self.retire();
                return Err(e.into());
            }
        };

        self.claim().await;
        self.transition(WorkerState::Activated)?;

        info!(deleted = ?deleted, "Activated");
        self.ctx.emit(WorkerEvent::CachesPurged {
            version: self.version.clone(),
            deleted: deleted.clone(),
        });
        Ok(deleted)
    }

    /// Take control of every open client without waiting for a reload.
    pub async fn claim(&self) {
        let changed = self.ctx.clients.write().await.claim(&self.version);
        for client_id in changed {
            self.ctx.emit(WorkerEvent::ControllerChange {
                client_id,
                version: self.version.clone(),
            });
        }
    }

    /// Mark this version as superseded.
    pub(crate) fn retire(&self) {
        let mut state = self.lock_state();
        if *state == WorkerState::Redundant {
            return;
        }
        *state = WorkerState::Redundant;
        drop(state);

        debug!(version = %self.version, "Worker is redundant");
        self.ctx.emit(WorkerEvent::StateChange {
            version: self.version.clone(),
            state: WorkerState::Redundant,
        });
    }

    // ===== Fetch =====

    /// Same-origin GET requests are handled; everything else passes through.
    pub fn intercepts(&self, request: &Request) -> bool {
        request.is_get() && request.url.origin() == self.scope.origin()
    }

    /// Serve a request cache-first.
    ///
    /// The network fetch starts before the cache lookup and keeps running
    /// after a cache hit has been returned, so every intercepted request
    /// refreshes its cache entry when the network allows.
    pub async fn handle_fetch(&self, request: Request) -> FetchOutcome {
        if !self.intercepts(&request) {
            trace!(method = %request.method, url = %request.url, "Passing request through");
            return FetchOutcome::Passthrough(request);
        }

        let cache = self.cache_handle().await;
        let network = tokio::spawn(refresh(self.ctx.clone(), cache.clone(), request.clone()));

        let cached = match &cache {
            Some(cache) => cache.match_request(&request).await,
            None => None,
        };
        if let Some(response) = cached {
            debug!(url = %request.url, "Serving from cache");
            return FetchOutcome::Respond {
                response,
                source: ResponseSource::Cache,
            };
        }

        match network.await {
            Ok(Some(response)) => FetchOutcome::Respond {
                response,
                source: ResponseSource::Network,
            },
            Ok(None) => {
                debug!(url = %request.url, "Offline with nothing cached, serving 504");
                FetchOutcome::Respond {
                    response: Response::gateway_timeout(),
                    source: ResponseSource::Fallback,
                }
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network task failed");
                FetchOutcome::Respond {
                    response: Response::gateway_timeout(),
                    source: ResponseSource::Fallback,
                }
            }
        }
    }

    /// This version's cache. Live workers open it on demand; a redundant
    /// worker never brings back a cache that activation removed.
    async fn cache_handle(&self) -> Option<Cache> {
        let name = self.version.as_str();
        if self.state() == WorkerState::Redundant {
            return self.ctx.storage.get(name).await;
        }
        match self.ctx.storage.open(name).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(cache = name, error = %e, "Failed to open cache");
                self.ctx.storage.get(name).await
            }
        }
    }

    fn transition(&self, next: WorkerState) -> Result<(), WorkerError> {
        let mut state = self.lock_state();
        if !state.can_transition_to(next) {
            return Err(WorkerError::InvalidTransition {
                version: self.version.clone(),
                from: *state,
                to: next,
            });
        }
        *state = next;
        drop(state);

        debug!(version = %self.version, state = %next, "Worker state changed");
        self.ctx.emit(WorkerEvent::StateChange {
            version: self.version.clone(),
            state: next,
        });
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fetch from the network and, for cacheable responses, write a copy back
/// without holding up the caller. Network failures become `None`.
///
/// The write goes through the handle taken when the request arrived. If
/// that cache was deleted in the meantime the copy is dropped.
async fn refresh(ctx: WorkerContext, cache: Option<Cache>, request: Request) -> Option<Response> {
    let key = request.key();

    let response = match ctx.fetcher.fetch(&request).await {
        Ok(response) => response,
        Err(e) => {
            debug!(key = %key, error = %e, "Network fetch failed");
            ctx.emit(WorkerEvent::RefreshFailed {
                key,
                error: e.to_string(),
            });
            return None;
        }
    };

    let cache = match cache {
        Some(cache) if !cache.is_detached() => cache,
        _ => {
            debug!(key = %key, "Cache is gone, not storing refreshed response");
            ctx.emit(WorkerEvent::RefreshSkipped {
                key,
                status: response.status,
                response_type: response.response_type,
            });
            return Some(response);
        }
    };

    if !response.is_cacheable() {
        debug!(
            key = %key,
            status = response.status,
            response_type = ?response.response_type,
            "Response not cacheable"
        );
        ctx.emit(WorkerEvent::RefreshSkipped {
            key,
            status: response.status,
            response_type: response.response_type,
        });
        return Some(response);
    }

    let copy = response.clone();
    tokio::spawn(async move {
        match cache.put(&request, copy).await {
            Ok(()) => {
                trace!(key = %key, "Cache refreshed");
                ctx.emit(WorkerEvent::CacheRefreshed { key });
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to store refreshed response");
                ctx.emit(WorkerEvent::RefreshFailed {
                    key,
                    error: e.to_string(),
                });
            }
        }
    });

    Some(response)
}
