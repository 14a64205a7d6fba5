use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::{CacheEntry, CacheError};
use crate::models::{Request, RequestKey, Response};

/// On-disk layout of one cache.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CacheFile {
    pub name: String,
    #[serde(default)]
    pub entries: Vec<CacheEntry>,
}

impl CacheFile {
    pub(crate) fn read(path: &Path) -> Result<Self, CacheError> {
        let contents = std::fs::read_to_string(path).map_err(|e| CacheError::io(path, e))?;
        serde_json::from_str(&contents).map_err(|source| CacheError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    name: &'a str,
    entries: Vec<&'a CacheEntry>,
}

struct CacheInner {
    name: String,
    entries: RwLock<HashMap<RequestKey, CacheEntry>>,
    file: Option<PathBuf>,
    /// Set once the cache is deleted from its storage; later writes stay in memory.
    detached: AtomicBool,
}

/// A single named cache mapping GET requests to responses.
///
/// Clone is cheap and every clone refers to the same entries.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .field("file", &self.inner.file)
            .finish()
    }
}

impl Cache {
    pub(crate) fn new(name: &str, file: Option<PathBuf>, entries: Vec<CacheEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| (entry.key.clone(), entry))
            .collect();
        Self {
            inner: Arc::new(CacheInner {
                name: name.to_string(),
                entries: RwLock::new(entries),
                file,
                detached: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Look up a stored response for the request.
    pub async fn match_request(&self, request: &Request) -> Option<Response> {
        let entries = self.inner.entries.read().await;
        entries.get(&request.key()).map(|entry| entry.response.clone())
    }

    /// Store a response, replacing any previous entry for the same request.
    pub async fn put(&self, request: &Request, response: Response) -> Result<(), CacheError> {
        if !request.is_get() {
            return Err(CacheError::UnsupportedMethod(request.method.clone()));
        }

        let key = request.key();
        let mut entries = self.inner.entries.write().await;
        trace!(cache = %self.inner.name, key = %key, status = response.status, "Cache put");
        entries.insert(key.clone(), CacheEntry::new(key, response));
        self.persist(&entries)
    }

    /// Store several responses with a single write of the cache file.
    /// Nothing is stored if any request is not a GET.
    pub async fn put_all(&self, items: Vec<(Request, Response)>) -> Result<(), CacheError> {
        if let Some((request, _)) = items.iter().find(|(request, _)| !request.is_get()) {
            return Err(CacheError::UnsupportedMethod(request.method.clone()));
        }
        if items.is_empty() {
            return Ok(());
        }

        let mut entries = self.inner.entries.write().await;
        trace!(cache = %self.inner.name, count = items.len(), "Cache put_all");
        for (request, response) in items {
            let key = request.key();
            entries.insert(key.clone(), CacheEntry::new(key, response));
        }
        self.persist(&entries)
    }

    pub async fn delete(&self, request: &Request) -> Result<bool, CacheError> {
        let mut entries = self.inner.entries.write().await;
        let removed = entries.remove(&request.key()).is_some();
        if removed {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    /// Stored request keys, sorted.
    pub async fn keys(&self) -> Vec<RequestKey> {
        let mut keys: Vec<RequestKey> = self.inner.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Stored entries, sorted by key.
    pub async fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> =
            self.inner.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop persisting. Takes the entries lock so a write already in
    /// progress lands before the file is removed.
    pub(crate) async fn detach(&self) {
        let _entries = self.inner.entries.write().await;
        self.inner.detached.store(true, Ordering::SeqCst);
    }

    /// Whether the cache has been deleted from its storage.
    pub fn is_detached(&self) -> bool {
        self.inner.detached.load(Ordering::SeqCst)
    }

    pub(crate) fn file(&self) -> Option<&Path> {
        self.inner.file.as_deref()
    }

    /// Write the cache file. Callers hold the entries write lock, which
    /// serializes writers of the same file.
    pub(crate) fn persist(&self, entries: &HashMap<RequestKey, CacheEntry>) -> Result<(), CacheError> {
        let Some(path) = self.inner.file.as_ref() else {
            return Ok(());
        };
        if self.inner.detached.load(Ordering::SeqCst) {
            debug!(cache = %self.inner.name, "Cache was deleted, not persisting");
            return Ok(());
        }

        let mut sorted: Vec<&CacheEntry> = entries.values().collect();
        sorted.sort_by(|a, b| a.key.cmp(&b.key));
        let file = CacheFileRef {
            name: &self.inner.name,
            entries: sorted,
        };
        let contents =
            serde_json::to_string_pretty(&file).map_err(|source| CacheError::Serialize {
                name: self.inner.name.clone(),
                source,
            })?;
        std::fs::write(path, contents).map_err(|e| CacheError::io(path, e))
    }
}
