//! Support to download through an external fetch command.
//!
//! The command is invoked once per attempt as
//! `<command> <args>... <key> <destination>` and reports the outcome through
//! its exit status.

use std::io;
use std::path::Path;

use mediagate_sources::{ObjectKey, SubprocessSourceConfig};
use tokio::process::Command;

use crate::caching::{CacheEntry, CacheError};

/// Exit code by which the fetch command signals a missing object.
const NOT_FOUND_EXIT_CODE: i32 = 44;

/// Downloader implementation that shells out to a fetch command.
#[derive(Debug)]
pub struct SubprocessDownloader;

impl SubprocessDownloader {
    pub fn new() -> Self {
        Self
    }

    /// Runs the fetch command for `key`, writing to `destination`.
    pub async fn download_source(
        &self,
        source: &SubprocessSourceConfig,
        key: &ObjectKey,
        destination: &Path,
    ) -> CacheEntry {
        tracing::debug!("Fetching media file `{}` via {:?}", key, source.command);

        let mut command = Command::new(&source.command);
        command.args(&source.args).arg(key.as_str()).arg(destination);
        if let Some(dir) = &source.working_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => CacheError::PermissionDenied(format!(
                "fetch command not found: {}",
                source.command.display()
            )),
            _ => err.into(),
        })?;

        if output.status.success() {
            return Ok(());
        }

        match output.status.code() {
            Some(NOT_FOUND_EXIT_CODE) => Err(CacheError::NotFound),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(CacheError::DownloadError(format!(
                    "fetch command exited with {}: {}",
                    output.status,
                    stderr.trim()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use mediagate_sources::SourceId;

    fn source(command: &str, args: &[&str], working_dir: Option<PathBuf>) -> SubprocessSourceConfig {
        SubprocessSourceConfig {
            id: SourceId::new("cli"),
            command: PathBuf::from(command),
            args: args.iter().map(|s| s.to_string()).collect(),
            working_dir,
        }
    }

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_download_source() {
        mediagate_test::setup();

        let store = mediagate_test::tempdir();
        std::fs::write(store.path().join("clip.mp4"), b"mp4 bytes").unwrap();

        let tempdir = mediagate_test::tempdir();
        let destination = tempdir.path().join("clip.mp4");

        // `cp <key> <destination>` relative to the store directory
        let source = source("cp", &[], Some(store.path().to_owned()));
        SubprocessDownloader::new()
            .download_source(&source, &key("clip.mp4"), &destination)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"mp4 bytes");
    }

    #[tokio::test]
    async fn test_not_found_exit_code() {
        mediagate_test::setup();

        let tempdir = mediagate_test::tempdir();
        let destination = tempdir.path().join("missing.mp4");

        let source = source("sh", &["-c", "exit 44", "fetch"], None);
        let result = SubprocessDownloader::new()
            .download_source(&source, &key("missing.mp4"), &destination)
            .await;

        assert_eq!(result, Err(CacheError::NotFound));
    }

    #[tokio::test]
    async fn test_failure_captures_stderr() {
        mediagate_test::setup();

        let tempdir = mediagate_test::tempdir();
        let destination = tempdir.path().join("bad.mp4");

        let source = source("sh", &["-c", "echo 'boom' >&2; exit 1", "fetch"], None);
        let result = SubprocessDownloader::new()
            .download_source(&source, &key("bad.mp4"), &destination)
            .await;

        match result {
            Err(CacheError::DownloadError(details)) => assert!(details.contains("boom")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_command() {
        mediagate_test::setup();

        let tempdir = mediagate_test::tempdir();
        let destination = tempdir.path().join("x.bin");

        let source = source("/nonexistent/fetch-media", &[], None);
        let result = SubprocessDownloader::new()
            .download_source(&source, &key("x.bin"), &destination)
            .await;

        assert!(matches!(result, Err(CacheError::PermissionDenied(_))));
    }
}
