//! The local media cache.
//!
//! [`MediaCache`] turns an [`ObjectKey`] into a ready-to-serve local file
//! path, either instantly (cache hit) or after a fetch-and-store cycle
//! through the [`DownloadService`](crate::download::DownloadService). Every
//! successful access re-arms the entry's eviction timer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use mediagate_sources::{ObjectKey, SourceConfig};
use tempfile::NamedTempFile;

mod cache_error;
mod cleanup;
mod eviction;

pub use cache_error::{CacheEntry, CacheError};
pub use cleanup::cleanup;
pub use eviction::EvictionScheduler;

use crate::config::Config;
use crate::download::DownloadService;

/// The media cache resolver.
///
/// The cache directory is the durable store; the in-memory state is only the
/// eviction timer index and the in-flight download locks, so after a restart
/// the cache is exactly as empty or full as the directory on disk.
pub struct MediaCache {
    cache_dir: PathBuf,
    sources: Arc<[SourceConfig]>,
    downloader: Arc<DownloadService>,
    eviction: EvictionScheduler,
    inflight: Mutex<HashMap<ObjectKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl MediaCache {
    /// Creates the cache, its directory, and the eviction scheduler.
    pub fn new(config: &Config, downloader: Arc<DownloadService>) -> std::io::Result<Self> {
        let cache_dir = config.cache_dir.clone();
        std::fs::create_dir_all(&cache_dir)?;

        Ok(Self {
            eviction: EvictionScheduler::new(cache_dir.clone(), config.eviction_after),
            cache_dir,
            sources: config.sources.clone(),
            downloader,
            inflight: Mutex::default(),
        })
    }

    /// The eviction scheduler owning this cache's timers.
    pub fn eviction(&self) -> &EvictionScheduler {
        &self.eviction
    }

    /// Resolves `key` to a local file path.
    ///
    /// Serves straight from disk on a hit; on a miss the object is fetched
    /// from the configured sources, stored, and only then returned. Either
    /// way the eviction timer for the entry is re-armed. Callers cannot
    /// distinguish the two paths from the result alone.
    pub async fn resolve(&self, key: &ObjectKey) -> CacheEntry<PathBuf> {
        let local_path = self.cache_dir.join(key.as_str());

        if path_exists(&local_path).await {
            tracing::debug!(%key, "serving from cache");
            self.eviction.touch(key);
            return Ok(local_path);
        }

        // Concurrent misses for the same key funnel through one lock, so the
        // object is downloaded once and the waiters observe a hit.
        let lock = self.inflight_lock(key);
        let guard = lock.lock().await;

        let result = if path_exists(&local_path).await {
            tracing::debug!(%key, "serving from cache");
            self.eviction.touch(key);
            Ok(local_path)
        } else {
            tracing::debug!(%key, "not cached, downloading");
            self.fetch_and_store(key, local_path).await
        };

        drop(guard);
        self.release_inflight(key, &lock);

        result
    }

    /// Downloads `key` from the first source that has it and moves the
    /// result into place.
    async fn fetch_and_store(&self, key: &ObjectKey, local_path: PathBuf) -> CacheEntry<PathBuf> {
        // Downloads land in a temp file in the cache directory and are
        // renamed into place only when complete. A failed attempt drops the
        // temp file, so no partial entry can ever be served.
        let temp_file = NamedTempFile::new_in(&self.cache_dir)?;

        let mut last_error = CacheError::NotFound;
        for source in self.sources.iter() {
            match self
                .downloader
                .download(source, key, temp_file.path())
                .await
            {
                Ok(()) => {
                    temp_file
                        .persist(&local_path)
                        .map_err(|err| CacheError::LocalIo(err.error.to_string()))?;
                    self.eviction.touch(key);
                    return Ok(local_path);
                }
                Err(CacheError::NotFound) => {
                    // fall through to the next source
                }
                Err(err) => {
                    tracing::warn!(
                        %key,
                        source = source.id().as_str(),
                        "source failed: {err}"
                    );
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }

    fn inflight_lock(&self, key: &ObjectKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut inflight = self.inflight.lock().unwrap();
        inflight.entry(key.clone()).or_default().clone()
    }

    fn release_inflight(&self, key: &ObjectKey, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut inflight = self.inflight.lock().unwrap();
        // Two references remain when nobody else is waiting: the map's and
        // the caller's.
        if Arc::strong_count(lock) <= 2 {
            inflight.remove(key);
        }
    }
}

async fn path_exists(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use mediagate_sources::{SourceId, SubprocessSourceConfig};

    use crate::config::Config;
    use crate::download::DownloadService;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new(name).unwrap()
    }

    /// A cache backed by a `cp` subprocess source reading from `store`.
    fn cache_config(store: &std::path::Path, cache_dir: &std::path::Path) -> Config {
        Config {
            cache_dir: cache_dir.to_owned(),
            eviction_after: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(10),
            sources: Arc::from(vec![SourceConfig::Subprocess(Arc::new(
                SubprocessSourceConfig {
                    id: SourceId::new("store"),
                    command: "cp".into(),
                    args: vec![],
                    working_dir: Some(store.to_owned()),
                },
            ))]),
            ..Config::default()
        }
    }

    fn media_cache(config: &Config) -> MediaCache {
        MediaCache::new(config, DownloadService::new(config)).unwrap()
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        mediagate_test::setup();

        let store = mediagate_test::tempdir();
        std::fs::write(store.path().join("photo.jpg"), b"jpeg bytes").unwrap();
        let cache_dir = mediagate_test::tempdir();

        let config = cache_config(store.path(), cache_dir.path());
        let cache = media_cache(&config);

        // miss: fetched from the source
        let path = cache.resolve(&key("photo.jpg")).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg bytes");
        assert!(cache.eviction().is_armed(&key("photo.jpg")));

        // hit: served again even after the source loses the object
        std::fs::remove_file(store.path().join("photo.jpg")).unwrap();
        let path = cache.resolve(&key("photo.jpg")).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_missing_object() {
        mediagate_test::setup();

        let store = mediagate_test::tempdir();
        let cache_dir = mediagate_test::tempdir();

        let config = cache_config(store.path(), cache_dir.path());
        let cache = media_cache(&config);

        let result = cache.resolve(&key("absent.png")).await;
        // `cp` exits non-zero for a missing source file
        assert!(result.is_err());
        assert!(!cache.eviction().is_armed(&key("absent.png")));

        // no partial entry is left behind
        let leftovers: Vec<_> = std::fs::read_dir(cache_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        mediagate_test::setup();

        let store = mediagate_test::tempdir();
        std::fs::write(store.path().join("clip.mp4"), b"mp4 bytes").unwrap();
        let cache_dir = mediagate_test::tempdir();

        // count fetches through a wrapper script
        let counter = store.path().join("fetches");
        let script = store.path().join("fetch.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\necho x >> fetches\ncp \"$1\" \"$2\"\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let mut config = cache_config(store.path(), cache_dir.path());
        config.sources = Arc::from(vec![SourceConfig::Subprocess(Arc::new(
            SubprocessSourceConfig {
                id: SourceId::new("store"),
                command: script,
                args: vec![],
                working_dir: Some(store.path().to_owned()),
            },
        ))]);

        let cache = Arc::new(media_cache(&config));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.resolve(&key("clip.mp4")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let fetches = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(fetches.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_eviction_makes_key_a_fresh_miss() {
        mediagate_test::setup();

        let store = mediagate_test::tempdir();
        std::fs::write(store.path().join("photo.jpg"), b"v1").unwrap();
        let cache_dir = mediagate_test::tempdir();

        let mut config = cache_config(store.path(), cache_dir.path());
        config.eviction_after = Duration::from_millis(50);
        let cache = media_cache(&config);

        let path = cache.resolve(&key("photo.jpg")).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"v1");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!path.exists());

        // the next resolve goes back to the source
        std::fs::write(store.path().join("photo.jpg"), b"v2").unwrap();
        let path = cache.resolve(&key("photo.jpg")).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"v2");
    }
}
