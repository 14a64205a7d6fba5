use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::store::CacheFile;
use super::{Cache, CacheError};

/// Extension of cache files inside a storage directory.
const CACHE_FILE_EXT: &str = "json";

/// The set of named caches belonging to one origin.
pub struct CacheStorage {
    caches: RwLock<HashMap<String, Cache>>,
    dir: Option<PathBuf>,
}

impl CacheStorage {
    /// Storage that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            dir: None,
        }
    }

    /// Storage backed by a directory, loading any caches already there.
    /// Unreadable cache files are skipped rather than failing the load.
    pub fn open_dir(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let mut caches = HashMap::new();
        let listing = std::fs::read_dir(&dir).map_err(|e| CacheError::io(&dir, e))?;
        for item in listing {
            let path = item.map_err(|e| CacheError::io(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CACHE_FILE_EXT) {
                continue;
            }
            match CacheFile::read(&path) {
                Ok(file) => {
                    debug!(cache = %file.name, entries = file.entries.len(), "Loaded cache from disk");
                    let cache = Cache::new(&file.name, Some(path), file.entries);
                    caches.insert(file.name, cache);
                }
                Err(e) => warn!(error = %e, "Skipping unreadable cache file"),
            }
        }

        info!(dir = %dir.display(), caches = caches.len(), "Cache storage opened");
        Ok(Self {
            caches: RwLock::new(caches),
            dir: Some(dir),
        })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Open the named cache, creating it if it does not exist.
    pub async fn open(&self, name: &str) -> Result<Cache, CacheError> {
        if let Some(cache) = self.caches.read().await.get(name) {
            return Ok(cache.clone());
        }

        let mut caches = self.caches.write().await;
        if let Some(cache) = caches.get(name) {
            return Ok(cache.clone());
        }

        let cache = Cache::new(name, self.file_for(name), Vec::new());
        // Write the empty cache so it is listed after a restart
        cache.persist(&HashMap::new())?;
        debug!(cache = name, "Created cache");
        caches.insert(name.to_string(), cache.clone());
        Ok(cache)
    }

    /// The named cache, without creating it.
    pub async fn get(&self, name: &str) -> Option<Cache> {
        self.caches.read().await.get(name).cloned()
    }

    pub async fn has(&self, name: &str) -> bool {
        self.caches.read().await.contains_key(name)
    }

    /// Delete the named cache. Handles already held keep working in memory
    /// but no longer write to disk.
    pub async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let removed = self.caches.write().await.remove(name);
        let Some(cache) = removed else {
            return Ok(false);
        };
        cache.detach().await;

        if let Some(path) = cache.file() {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(path, e)),
            }
        }
        debug!(cache = name, "Deleted cache");
        Ok(true)
    }

    /// Cache names, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Delete every cache except `keep`. Every deletion is awaited, even
    /// when one of them fails; the first failure is then returned.
    /// Returns the deleted names.
    pub async fn retain_only(&self, keep: &str) -> Result<Vec<String>, CacheError> {
        let stale: Vec<String> = self
            .keys()
            .await
            .into_iter()
            .filter(|name| name != keep)
            .collect();

        let results = join_all(stale.iter().map(|name| self.delete(name))).await;
        for result in results {
            result?;
        }
        Ok(stale)
    }

    fn file_for(&self, name: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}", file_stem(name), CACHE_FILE_EXT)))
    }
}

/// Cache names are free-form. Percent-encode them into a portable file
/// name; distinct names always get distinct files.
fn file_stem(name: &str) -> String {
    url::form_urlencoded::byte_serialize(name.as_bytes())
        .collect::<String>()
        .replace('*', "%2A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Request, Response};
    use url::Url;

    fn get(path: &str) -> Request {
        Request::get(Url::parse("https://voice.example/").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn test_open_creates_once() {
        let storage = CacheStorage::in_memory();
        assert!(!storage.has("v1").await);

        let a = storage.open("v1").await.unwrap();
        a.put(&get("a.js"), Response::new(200, "")).await.unwrap();
        let b = storage.open("v1").await.unwrap();

        assert_eq!(b.len().await, 1);
        assert_eq!(storage.keys().await, vec!["v1"]);
    }

    #[tokio::test]
    async fn test_get_does_not_create() {
        let storage = CacheStorage::in_memory();
        assert!(storage.get("v1").await.is_none());
        assert!(!storage.has("v1").await);
    }

    #[tokio::test]
    async fn test_retain_only_purges_others() {
        let storage = CacheStorage::in_memory();
        for name in ["imv-voice-v5", "imv-voice-v6", "imv-voice-v7", "other"] {
            storage.open(name).await.unwrap();
        }

        let deleted = storage.retain_only("imv-voice-v7").await.unwrap();
        assert_eq!(deleted, vec!["imv-voice-v5", "imv-voice-v6", "other"]);
        assert_eq!(storage.keys().await, vec!["imv-voice-v7"]);

        // Nothing left to delete the second time
        assert!(storage.retain_only("imv-voice-v7").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retain_only_when_current_missing() {
        let storage = CacheStorage::in_memory();
        storage.open("old").await.unwrap();

        storage.retain_only("new").await.unwrap();
        assert!(storage.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_directory_storage_reloads() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = CacheStorage::open_dir(dir.path()).unwrap();
            let cache = storage.open("imv-voice-v7").await.unwrap();
            cache.put(&get("lessons.js"), Response::new(200, "lessons")).await.unwrap();
            storage.open("empty").await.unwrap();
        }

        let storage = CacheStorage::open_dir(dir.path()).unwrap();
        assert_eq!(storage.keys().await, vec!["empty", "imv-voice-v7"]);
        let cache = storage.get("imv-voice-v7").await.unwrap();
        let hit = cache.match_request(&get("lessons.js")).await.unwrap();
        assert_eq!(hit.body, b"lessons");
    }

    #[tokio::test]
    async fn test_delete_removes_file_and_detaches() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::open_dir(dir.path()).unwrap();
        let cache = storage.open("old").await.unwrap();
        let path = dir.path().join("old.json");
        assert!(path.exists());

        assert!(storage.delete("old").await.unwrap());
        assert!(!path.exists());

        // A late write through a stale handle must not resurrect the file
        cache.put(&get("a.js"), Response::new(200, "")).await.unwrap();
        assert!(!path.exists());
        assert!(!storage.delete("old").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let storage = CacheStorage::open_dir(dir.path()).unwrap();
        assert!(storage.keys().await.is_empty());
    }

    #[test]
    fn test_file_stem_is_portable_and_distinct() {
        assert_eq!(file_stem("imv-voice-v7"), "imv-voice-v7");
        assert_eq!(file_stem("a/b c*"), "a%2Fb+c%2A");
        assert_ne!(file_stem("a b"), file_stem("a_b"));
        assert_ne!(file_stem("a b"), file_stem("a+b"));
    }

    #[tokio::test]
    async fn test_similar_names_keep_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = CacheStorage::open_dir(dir.path()).unwrap();
            storage.open("a b").await.unwrap();
            let kept = storage.open("a_b").await.unwrap();
            kept.put(&get("a.js"), Response::new(200, "kept")).await.unwrap();

            assert!(storage.delete("a b").await.unwrap());
        }

        let storage = CacheStorage::open_dir(dir.path()).unwrap();
        assert_eq!(storage.keys().await, vec!["a_b"]);
        let hit = storage.get("a_b").await.unwrap().match_request(&get("a.js")).await;
        assert_eq!(hit.unwrap().body, b"kept");
    }

    #[tokio::test]
    async fn test_delete_uses_the_loaded_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renamed.json");
        std::fs::write(&path, r#"{ "name": "v1", "entries": [] }"#).unwrap();

        let storage = CacheStorage::open_dir(dir.path()).unwrap();
        assert_eq!(storage.keys().await, vec!["v1"]);
        assert!(storage.delete("v1").await.unwrap());
        assert!(!path.exists());
    }
}
