//! Wiring between the configuration and the cache worker, plus the
//! command implementations.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};
use url::Url;

use voicecache_core::{
    CacheStorage, CacheWorker, Config, ControlMessage, FetchOutcome, HttpFetcher, Registration,
    Request, RequestKey, ResponseSource, WorkerContext, WorkerEvent,
};

pub struct Session {
    config: Config,
    scope: Url,
    ctx: WorkerContext,
    events: UnboundedReceiver<WorkerEvent>,
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    name: String,
    current: bool,
    entries: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    items: Vec<EntrySummary>,
}

#[derive(Debug, Serialize)]
struct EntrySummary {
    url: String,
    status: u16,
    bytes: usize,
    age: String,
}

impl Session {
    pub fn open(config: Config) -> Result<Self> {
        let scope = config.scope()?;
        let cache_dir = config.cache_dir()?;
        debug!(?cache_dir, "Cache directory configured");

        let storage = CacheStorage::open_dir(&cache_dir)
            .with_context(|| format!("Failed to open cache directory {}", cache_dir.display()))?;
        let fetcher = HttpFetcher::new(&scope, config.request_timeout())
            .context("Failed to create HTTP client")?;
        let (ctx, events) = WorkerContext::new(Arc::new(storage), Arc::new(fetcher));

        Ok(Self::with_context(config, scope, ctx, events))
    }

    fn with_context(
        config: Config,
        scope: Url,
        ctx: WorkerContext,
        events: UnboundedReceiver<WorkerEvent>,
    ) -> Self {
        Self {
            config,
            scope,
            ctx,
            events,
        }
    }

    fn worker(&self, auto_activate: bool) -> Result<CacheWorker> {
        let settings = self
            .config
            .worker_settings()?
            .with_auto_activate(auto_activate);
        Ok(CacheWorker::new(settings, self.ctx.clone())?)
    }

    /// Install the configured version; activate unless told to wait.
    pub async fn update(&mut self, wait: bool, message: Option<&str>) -> Result<()> {
        let registration = Registration::new(self.scope.clone());
        let worker = self.worker(self.config.auto_activate && !wait)?;
        let version = worker.version().clone();

        let report = registration.update(worker).await?;
        println!(
            "Installed {}: {} cached, {} failed",
            version,
            report.cached.len(),
            report.failed.len()
        );
        for url in &report.failed {
            println!("  not cached: {}", url);
        }

        if let Some(raw) = message {
            let message = ControlMessage::parse(raw)
                .ok_or_else(|| anyhow::anyhow!("Message must be a JSON object: {}", raw))?;
            if !registration.post_message(&message).await? {
                println!("Message ignored");
            }
        }

        while let Ok(event) = self.events.try_recv() {
            if let WorkerEvent::CachesPurged { deleted, .. } = event {
                for name in deleted {
                    println!("Deleted cache {}", name);
                }
            }
        }

        match registration.active_version().await {
            Some(active) => println!("Active version: {}", active),
            None => println!("{} is waiting to activate", version),
        }
        Ok(())
    }

    /// Fetch one target through the cache and write the body to `out`.
    /// The body is written as soon as it is known; the background refresh
    /// is awaited afterwards so the cache file is current on exit.
    pub async fn fetch<W: Write>(
        &mut self,
        target: &str,
        method: &str,
        include: bool,
        out: &mut W,
    ) -> Result<()> {
        let url = self
            .scope
            .join(target)
            .with_context(|| format!("Invalid target: {}", target))?;
        let request = Request::new(method, url);
        let key = request.key();

        let worker = self.worker(false)?;
        let (response, label, refreshing) = match worker.handle_fetch(request).await {
            FetchOutcome::Respond { response, source } => {
                let label = match source {
                    ResponseSource::Cache => "cache",
                    ResponseSource::Network => "network",
                    ResponseSource::Fallback => "offline",
                };
                (response, label, true)
            }
            FetchOutcome::Passthrough(request) => {
                let response = self.ctx.fetcher.fetch(&request).await?;
                (response, "passthrough", false)
            }
        };
        info!(key = %key, status = response.status, source = label, "Fetch complete");

        if include {
            eprintln!("{} {} ({})", response.status, response.status_text, label);
            for (name, value) in &response.headers {
                eprintln!("{}: {}", name, value);
            }
            eprintln!();
        }
        out.write_all(&response.body)?;
        out.flush()?;

        if refreshing {
            self.wait_for_refresh(&key).await;
        }
        Ok(())
    }

    async fn wait_for_refresh(&mut self, key: &RequestKey) {
        while let Some(event) = self.events.recv().await {
            if event.refresh_key() == Some(key) {
                debug!(?event, "Background refresh finished");
                return;
            }
        }
    }

    pub async fn status(&self, entries: bool, json: bool) -> Result<()> {
        let current = self.config.cache_version();
        let mut summaries = Vec::new();

        for name in self.ctx.storage.keys().await {
            let Some(cache) = self.ctx.storage.get(&name).await else {
                continue;
            };
            let stored = cache.entries().await;
            let items = if entries {
                stored
                    .iter()
                    .map(|entry| EntrySummary {
                        url: entry.key.url.clone(),
                        status: entry.response.status,
                        bytes: entry.response.body.len(),
                        age: entry.age_display(),
                    })
                    .collect()
            } else {
                Vec::new()
            };
            summaries.push(CacheSummary {
                current: current.as_str() == name,
                name,
                entries: stored.len(),
                items,
            });
        }

        if json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
            return Ok(());
        }

        if summaries.is_empty() {
            println!("No caches for {}", self.scope);
        }
        for summary in &summaries {
            let marker = if summary.current { "*" } else { " " };
            println!("{} {} ({} entries)", marker, summary.name, summary.entries);
            for item in &summary.items {
                println!("    {} {} {}B {}", item.status, item.url, item.bytes, item.age);
            }
        }
        Ok(())
    }

    pub async fn purge(&self) -> Result<()> {
        let current = self.config.cache_version();
        let deleted = self.ctx.storage.retain_only(current.as_str()).await?;
        if deleted.is_empty() {
            println!("Nothing to purge");
        }
        for name in deleted {
            println!("Deleted cache {}", name);
        }
        Ok(())
    }
}
