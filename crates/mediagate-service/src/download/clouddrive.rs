//! Support to download from a consumer cloud-drive API.
//!
//! The drive requires a login handshake before every fetch. The resulting
//! session authorizes a folder lookup by name, a file lookup within that
//! folder, and the content download. The session is explicitly closed on
//! every exit path, success or failure, so no connection lingers on the
//! drive's side.

use futures::prelude::*;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

use mediagate_sources::{CloudDriveSourceConfig, ObjectKey};

use crate::caching::{CacheEntry, CacheError};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: String,
}

#[derive(Debug, Deserialize)]
struct FolderResponse {
    #[serde(rename = "folderid")]
    folder_id: u64,
}

/// A logged-in drive session.
///
/// Holders must call [`close`](Self::close) when done; dropping the session
/// without closing it leaks a lingering connection on the drive's side.
struct DriveSession {
    token: String,
}

/// Downloader implementation that supports the cloud-drive source.
#[derive(Debug)]
pub struct CloudDriveDownloader {
    client: Client,
}

impl CloudDriveDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api_url(base: &Url, segments: &[&str]) -> CacheEntry<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| CacheError::InternalError)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn login(&self, source: &CloudDriveSourceConfig) -> CacheEntry<DriveSession> {
        let url = Self::api_url(&source.base_url, &["login"])?;
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "username": source.username,
                "password": source.password,
            }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let login: LoginResponse = response
                    .json()
                    .await
                    .map_err(|e| CacheError::DownloadError(e.to_string()))?;
                Ok(DriveSession { token: login.auth })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CacheError::PermissionDenied(
                "cloud drive login rejected".to_string(),
            )),
            status => Err(CacheError::DownloadError(format!(
                "cloud drive login failed: {status}"
            ))),
        }
    }

    async fn close(&self, source: &CloudDriveSourceConfig, session: DriveSession) {
        let Ok(url) = Self::api_url(&source.base_url, &["logout"]) else {
            return;
        };
        let result = self
            .client
            .post(url)
            .bearer_auth(&session.token)
            .send()
            .await;
        if let Err(err) = result {
            let dynerr: &dyn std::error::Error = &err;
            tracing::debug!(error = dynerr, "failed to close cloud drive session");
        }
    }

    /// Looks up the configured folder, then the file within it, and streams
    /// the content into `destination`.
    async fn fetch_into(
        &self,
        session: &DriveSession,
        source: &CloudDriveSourceConfig,
        key: &ObjectKey,
        destination: impl AsyncWrite + Unpin,
    ) -> CacheEntry {
        let folder_url = Self::api_url(&source.base_url, &["folders"])?;
        let response = self
            .client
            .get(folder_url)
            .query(&[("name", source.folder.as_str())])
            .bearer_auth(&session.token)
            .send()
            .await?;

        let folder: FolderResponse = match response.status() {
            status if status.is_success() => response
                .json()
                .await
                .map_err(|e| CacheError::DownloadError(e.to_string()))?,
            // The expected folder not existing is terminal, unlike a flaky
            // network error.
            StatusCode::NOT_FOUND => return Err(CacheError::NotFound),
            status => {
                return Err(CacheError::DownloadError(format!(
                    "cloud drive folder lookup failed: {status}"
                )));
            }
        };

        let file_url = Self::api_url(
            &source.base_url,
            &["folders", &folder.folder_id.to_string(), "files", key.as_str()],
        )?;
        let response = self
            .client
            .get(file_url)
            .bearer_auth(&session.token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                self.stream_body(response, destination).await
            }
            StatusCode::NOT_FOUND => Err(CacheError::NotFound),
            status => Err(CacheError::DownloadError(format!(
                "cloud drive file download failed: {status}"
            ))),
        }
    }

    async fn stream_body(
        &self,
        response: reqwest::Response,
        mut destination: impl AsyncWrite + Unpin,
    ) -> CacheEntry {
        let mut stream = response.bytes_stream().map_err(CacheError::from);
        while let Some(chunk) = stream.next().await.transpose()? {
            destination.write_all(&chunk).await?;
        }
        Ok(())
    }

    /// Downloads a file from the cloud drive.
    ///
    /// A fresh session is established for the attempt and closed again on
    /// every exit path.
    pub async fn download_source(
        &self,
        source: &CloudDriveSourceConfig,
        key: &ObjectKey,
        destination: impl AsyncWrite + Unpin,
    ) -> CacheEntry {
        tracing::debug!("Fetching media file `{}` from cloud drive", key);

        let session = self.login(source).await?;
        let result = self.fetch_into(&session, source, key, destination).await;
        self.close(source, session).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mediagate_test::FakeDrive;

    fn downloader() -> CloudDriveDownloader {
        CloudDriveDownloader::new(Client::new())
    }

    #[tokio::test]
    async fn test_download_source() {
        mediagate_test::setup();

        let drive = FakeDrive::spawn(vec![("photo.jpg", b"jpeg bytes".to_vec())]).await;
        let source = drive.source_config("drive");

        let mut destination = Vec::new();
        let key = ObjectKey::new("photo.jpg").unwrap();
        downloader()
            .download_source(&source, &key, &mut destination)
            .await
            .unwrap();

        assert_eq!(destination, b"jpeg bytes");
        let stats = drive.stats();
        assert_eq!(stats.logins, 1);
        assert_eq!(stats.logouts, 1);
    }

    #[tokio::test]
    async fn test_download_source_missing_closes_session() {
        mediagate_test::setup();

        let drive = FakeDrive::spawn(vec![]).await;
        let source = drive.source_config("drive");

        let mut destination = Vec::new();
        let key = ObjectKey::new("absent.mp4").unwrap();
        let result = downloader()
            .download_source(&source, &key, &mut destination)
            .await;

        assert_eq!(result, Err(CacheError::NotFound));
        // the session is closed on the failure path too
        let stats = drive.stats();
        assert_eq!(stats.logins, 1);
        assert_eq!(stats.logouts, 1);
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        mediagate_test::setup();

        let drive = FakeDrive::spawn(vec![]).await;
        let mut source = drive.source_config("drive");
        {
            let cfg = std::sync::Arc::make_mut(&mut source);
            cfg.password = "wrong".to_owned();
        }

        let mut destination = Vec::new();
        let key = ObjectKey::new("photo.jpg").unwrap();
        let result = downloader()
            .download_source(&source, &key, &mut destination)
            .await;

        assert!(matches!(result, Err(CacheError::PermissionDenied(_))));
        assert_eq!(drive.stats().logouts, 0);
    }

    #[tokio::test]
    async fn test_missing_folder() {
        mediagate_test::setup();

        let drive = FakeDrive::spawn(vec![("photo.jpg", b"jpeg bytes".to_vec())]).await;
        let mut source = drive.source_config("drive");
        {
            let cfg = std::sync::Arc::make_mut(&mut source);
            cfg.folder = "does-not-exist".to_owned();
        }

        let mut destination = Vec::new();
        let key = ObjectKey::new("photo.jpg").unwrap();
        let result = downloader()
            .download_source(&source, &key, &mut destination)
            .await;

        assert_eq!(result, Err(CacheError::NotFound));
        assert_eq!(drive.stats().logouts, 1);
    }
}
