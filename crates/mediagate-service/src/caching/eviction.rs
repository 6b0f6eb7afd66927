use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mediagate_sources::ObjectKey;
use tokio::task::JoinHandle;

/// An armed eviction timer for a single cache entry.
struct TimerEntry {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Schedules the deletion of idle cache entries.
///
/// Every successful access to a cached file [touches](EvictionScheduler::touch)
/// its key, which (re-)arms a deletion timer for the configured idle window.
/// At most one timer is live per key: touching a key cancels its previous
/// timer before arming a new one, so a file is never deleted while a newer
/// access is still inside its own eviction window.
pub struct EvictionScheduler {
    cache_dir: PathBuf,
    window: Duration,
    timers: std::sync::Arc<Mutex<HashMap<ObjectKey, TimerEntry>>>,
    generation: AtomicU64,
}

impl EvictionScheduler {
    /// Creates a scheduler deleting files under `cache_dir` after `window` of
    /// idle time.
    pub fn new(cache_dir: PathBuf, window: Duration) -> Self {
        Self {
            cache_dir,
            window,
            timers: Default::default(),
            generation: AtomicU64::new(0),
        }
    }

    /// The configured idle window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Arms the eviction timer for `key`, cancelling any previous one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn touch(&self, key: &ObjectKey) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let path = self.cache_dir.join(key.as_str());
        let timers = std::sync::Arc::clone(&self.timers);
        let window = self.window;
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let mut timers = timers.lock().unwrap();
            // A newer touch re-arms the key with a fresh generation; in that
            // case the entry belongs to the newer timer and must survive.
            let owns_entry = timers
                .get(&task_key)
                .is_some_and(|entry| entry.generation == generation);
            if !owns_entry {
                return;
            }
            timers.remove(&task_key);

            // The delete happens under the index lock, keeping file removal
            // and index removal atomic with respect to concurrent touches.
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(key = %task_key, "evicted idle cache entry"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => (),
                Err(err) => {
                    let dynerr: &dyn std::error::Error = &err;
                    // The entry is already gone from the index, so a stuck
                    // file does not block future re-downloads of this key.
                    tracing::warn!(error = dynerr, key = %task_key, "failed to evict cache entry");
                }
            }
        });

        let mut timers = self.timers.lock().unwrap();
        if let Some(prev) = timers.insert(key.clone(), TimerEntry { generation, handle }) {
            prev.handle.abort();
        }
    }

    /// Whether an eviction timer is currently armed for `key`.
    pub fn is_armed(&self, key: &ObjectKey) -> bool {
        self.timers.lock().unwrap().contains_key(key)
    }

    /// Cancels all armed timers without deleting any files.
    ///
    /// Used for graceful shutdown and test teardown.
    pub fn cancel_all(&self) {
        let mut timers = self.timers.lock().unwrap();
        for (_, entry) in timers.drain() {
            entry.handle.abort();
        }
    }
}

impl Drop for EvictionScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
