use std::time::Duration;

use mediagate_sources::InvalidObjectKey;
use thiserror::Error;

/// An error that happens when resolving a media object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The object was not found at any remote source.
    #[error("not found")]
    NotFound,
    /// The object could not be fetched from the remote source due to missing
    /// permissions or a misconfigured backend.
    ///
    /// The attached string contains the remote source's response.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The object could not be fetched from the remote source due to a timeout.
    #[error("download timed out after {0:?}")]
    Timeout(Duration),
    /// The object could not be fetched from the remote source due to another
    /// problem, like connection loss, DNS resolution, or a 5xx server
    /// response, after all retries were exhausted.
    ///
    /// The attached string contains the last observed error.
    #[error("download failed: {0}")]
    DownloadError(String),
    /// The requested filename is not a valid single-segment object key.
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    /// Writing to or deleting from the local cache directory failed.
    #[error("local i/o error: {0}")]
    LocalIo(String),
    /// An unexpected error in mediagate itself.
    #[error("internal error")]
    InternalError,
}

impl From<std::io::Error> for CacheError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        let dynerr: &dyn std::error::Error = &err; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr, "local i/o error");
        Self::LocalIo(err.to_string())
    }
}

impl From<InvalidObjectKey> for CacheError {
    fn from(err: InvalidObjectKey) -> Self {
        Self::InvalidKey(err.to_string())
    }
}

impl CacheError {
    /// Builds a [`DownloadError`](Self::DownloadError) from the root cause of
    /// `error`.
    pub(crate) fn download_error(mut error: &dyn std::error::Error) -> Self {
        while let Some(src) = error.source() {
            error = src;
        }

        let mut error_string = error.to_string();

        // Special-case a few error strings
        if error_string.contains("certificate verify failed") {
            error_string = "certificate verify failed".to_string();
        }

        if error_string.contains("SSL routines") {
            error_string = "SSL error".to_string();
        }

        Self::DownloadError(error_string)
    }

    /// Whether retrying the fetch can possibly produce a different outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::NotFound | Self::PermissionDenied(_) | Self::InvalidKey(_)
        )
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(error: reqwest::Error) -> Self {
        Self::download_error(&error)
    }
}

/// The result of a cache resolution, either `Ok(T)` or the reason why the
/// object could not be fetched.
pub type CacheEntry<T = ()> = Result<T, CacheError>;
