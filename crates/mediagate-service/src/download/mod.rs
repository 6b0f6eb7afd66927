//! Service which handles all downloading from multiple kinds of media sources.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mediagate_sources::{ObjectKey, SourceConfig};
use tokio::io::AsyncWriteExt;

use crate::caching::{CacheEntry, CacheError};
use crate::config::Config;

mod clouddrive;
mod objectstore;
mod subprocess;

use clouddrive::CloudDriveDownloader;
use objectstore::ObjectStoreDownloader;
use subprocess::SubprocessDownloader;

/// A service which can download media objects from a [`SourceConfig`].
#[derive(Debug)]
pub struct DownloadService {
    max_attempts: usize,
    retry_backoff: Duration,
    download_timeout: Duration,
    objectstore: ObjectStoreDownloader,
    clouddrive: CloudDriveDownloader,
    subprocess: SubprocessDownloader,
}

impl DownloadService {
    /// Creates a new downloader for all configured source kinds.
    pub fn new(config: &Config) -> Arc<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap();

        Arc::new(Self {
            max_attempts: config.max_retries.max(1),
            retry_backoff: config.retry_backoff,
            download_timeout: config.download_timeout,
            objectstore: ObjectStoreDownloader::new(),
            clouddrive: CloudDriveDownloader::new(client),
            subprocess: SubprocessDownloader::new(),
        })
    }

    /// Dispatches downloading of the given object to the appropriate source.
    async fn dispatch_fetch(
        &self,
        source: &SourceConfig,
        key: &ObjectKey,
        destination: &Path,
    ) -> CacheEntry {
        // The file is re-created on every attempt so a failed attempt can
        // never leave half of its bytes in front of a successful retry.
        let mut file = tokio::fs::File::create(destination).await?;
        let result = match source {
            SourceConfig::ObjectStore(cfg) => {
                self.objectstore.download_source(cfg, key, &mut file).await
            }
            SourceConfig::CloudDrive(cfg) => {
                self.clouddrive.download_source(cfg, key, &mut file).await
            }
            SourceConfig::Subprocess(cfg) => {
                self.subprocess.download_source(cfg, key, destination).await
            }
        };
        let _ = file.flush().await;
        result
    }

    /// Download a media object from a source and store it at `destination`.
    ///
    /// The destination file will be created if it does not exist and truncated
    /// if it does. In case of any error, the file's contents is considered
    /// garbage. Transient failures are retried with a fixed backoff; not-found
    /// and permission errors short-circuit immediately.
    pub async fn download(
        &self,
        source: &SourceConfig,
        key: &ObjectKey,
        destination: &Path,
    ) -> CacheEntry {
        let timeout = self.download_timeout;
        let result = retry(
            || async {
                let job = self.dispatch_fetch(source, key, destination);
                match tokio::time::timeout(timeout, job).await {
                    Ok(result) => result,
                    Err(_) => Err(CacheError::Timeout(timeout)),
                }
            },
            self.max_attempts,
            self.retry_backoff,
        )
        .await;

        match &result {
            Ok(()) => {
                tracing::debug!(%key, source = source.type_name(), "object fetched successfully")
            }
            Err(err) => {
                tracing::debug!(%key, source = source.type_name(), "object fetch failed: {err}")
            }
        }

        result
    }
}

/// Try to run a fetch attempt up to `max_attempts` times with a fixed
/// `backoff` delay between attempts.
///
/// The backoff is only slept between attempts, never after the final one.
/// Outcomes that cannot change on a retry (`Ok`, not-found, permission
/// denied) short-circuit immediately. When all attempts are exhausted, the
/// last observed transient error is surfaced as
/// [`DownloadError`](CacheError::DownloadError).
pub async fn retry<G, F, T>(task_gen: G, max_attempts: usize, backoff: Duration) -> CacheEntry<T>
where
    G: Fn() -> F,
    F: Future<Output = CacheEntry<T>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        let result = task_gen().await;

        match result {
            Err(ref err) if err.is_retryable() && tries < max_attempts => {
                tokio::time::sleep(backoff).await;
            }
            Err(err) if err.is_retryable() => {
                break Err(match err {
                    CacheError::DownloadError(details) => CacheError::DownloadError(details),
                    other => CacheError::DownloadError(other.to_string()),
                });
            }
            result => break result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::Instant;

    const BACKOFF: Duration = Duration::from_secs(3);

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_last_attempt() {
        let attempts = AtomicUsize::new(0);
        let started = Instant::now();

        let result = retry(
            || async {
                match attempts.fetch_add(1, Ordering::Relaxed) {
                    0 | 1 => Err(CacheError::DownloadError("connection reset".into())),
                    _ => Ok(42),
                }
            },
            3,
            BACKOFF,
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
        // exactly two backoff delays, none after the final attempt
        assert_eq!(started.elapsed(), BACKOFF * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted() {
        let attempts = AtomicUsize::new(0);

        let result: CacheEntry<()> = retry(
            || async {
                attempts.fetch_add(1, Ordering::Relaxed);
                Err(CacheError::Timeout(Duration::from_secs(1)))
            },
            3,
            BACKOFF,
        )
        .await;

        assert_eq!(attempts.load(Ordering::Relaxed), 3);
        assert!(matches!(result, Err(CacheError::DownloadError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_short_circuits_terminal_errors() {
        for terminal in [
            CacheError::NotFound,
            CacheError::PermissionDenied("bad credentials".into()),
        ] {
            let attempts = AtomicUsize::new(0);
            let started = Instant::now();

            let result: CacheEntry<()> = retry(
                || async {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    Err(terminal.clone())
                },
                3,
                BACKOFF,
            )
            .await;

            assert_eq!(result, Err(terminal));
            assert_eq!(attempts.load(Ordering::Relaxed), 1);
            assert_eq!(started.elapsed(), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_immediate_success_sleeps_never() {
        let started = Instant::now();
        let result = retry(|| async { Ok("hit") }, 3, BACKOFF).await;
        assert_eq!(result, Ok("hit"));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
