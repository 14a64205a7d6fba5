//! Application configuration management.
//!
//! This module handles loading and saving the configuration: the origin
//! being cached, the current cache version tag, the asset manifest and
//! where cache files and logs live.
//!
//! Configuration is stored at `~/.config/voicecache/config.json`. The
//! `VOICECACHE_ORIGIN`, `VOICECACHE_VERSION` and `VOICECACHE_CACHE_DIR`
//! environment variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::CacheVersion;
use crate::worker::{normalize_scope, WorkerSettings};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "voicecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Cache generation shipped with the current site build.
pub const DEFAULT_VERSION: &str = "imv-voice-v7";

/// Assets pre-populated at install time, relative to the origin scope.
pub const DEFAULT_ASSETS: &[&str] = &[
    "./",
    "./index.html",
    "./lessons.js",
    "./library.js",
    "./missions.js",
    "./tracks.js",
];

pub const ENV_ORIGIN: &str = "VOICECACHE_ORIGIN";
pub const ENV_VERSION: &str = "VOICECACHE_VERSION";
pub const ENV_CACHE_DIR: &str = "VOICECACHE_CACHE_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scope URL of the site, e.g. `https://voice.example/`.
    pub origin: Option<String>,
    pub version: String,
    pub assets: Vec<String>,
    /// Activate a freshly installed version without waiting for a message.
    pub auto_activate: bool,
    /// Per-request network timeout. None waits as long as the network does.
    pub request_timeout_secs: Option<u64>,
    pub cache_dir: Option<PathBuf>,
    /// Write logs to daily files here instead of stderr.
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: None,
            version: DEFAULT_VERSION.to_string(),
            assets: DEFAULT_ASSETS.iter().map(|s| s.to_string()).collect(),
            auto_activate: true,
            request_timeout_secs: None,
            cache_dir: None,
            log_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(origin) = get(ENV_ORIGIN) {
            self.origin = Some(origin);
        }
        if let Some(version) = get(ENV_VERSION) {
            self.version = version;
        }
        if let Some(dir) = get(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    /// The normalized scope URL.
    pub fn scope(&self) -> Result<Url> {
        let origin = self.origin.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No origin configured (set `origin` in config or {})", ENV_ORIGIN)
        })?;
        let url = Url::parse(origin).with_context(|| format!("Invalid origin URL: {}", origin))?;
        Ok(normalize_scope(url))
    }

    pub fn cache_version(&self) -> CacheVersion {
        CacheVersion::new(self.version.clone())
    }

    /// Directory holding cache files: the configured one, or a per-host
    /// directory under the platform cache dir.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }

        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        let scope = self.scope()?;
        let mut host = scope.host_str().unwrap_or("local").to_string();
        if let Some(port) = scope.port() {
            host = format!("{}_{}", host, port);
        }
        Ok(cache_dir.join(APP_NAME).join(host))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn worker_settings(&self) -> Result<WorkerSettings> {
        Ok(WorkerSettings::new(self.cache_version(), self.scope()?)
            .with_assets(self.assets.iter().cloned())
            .with_auto_activate(self.auto_activate))
    }
}
