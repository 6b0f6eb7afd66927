//! Support to download from S3-compatible object storage.

use std::fmt;
use std::sync::Arc;

use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
pub use aws_sdk_s3::Error as S3Error;
use mediagate_sources::{ObjectKey, ObjectStoreSourceConfig, ObjectStoreSourceKey};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::caching::{CacheEntry, CacheError};

/// One cached client per bucket credential set.
type ClientCache = moka::future::Cache<Arc<ObjectStoreSourceKey>, Arc<Client>>;

/// How many distinct bucket clients to keep around.
const CLIENT_CAPACITY: u64 = 100;

/// Downloader implementation that supports S3-compatible object stores.
pub struct ObjectStoreDownloader {
    client_cache: ClientCache,
}

impl fmt::Debug for ObjectStoreDownloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreDownloader").finish()
    }
}

impl ObjectStoreDownloader {
    pub fn new() -> Self {
        Self {
            client_cache: ClientCache::new(CLIENT_CAPACITY),
        }
    }

    async fn get_client(&self, key: &Arc<ObjectStoreSourceKey>) -> Arc<Client> {
        let init = Box::pin(async {
            let credentials =
                Credentials::from_keys(key.access_key.clone(), key.secret_key.clone(), None);
            let mut config_loader = aws_config::from_env()
                .credentials_provider(credentials)
                .region(Region::new(key.region.clone()));

            if let Some(endpoint) = &key.endpoint {
                config_loader = config_loader.endpoint_url(endpoint.as_str());
            }

            let config = config_loader.load().await;
            Arc::new(Client::new(&config))
        });

        self.client_cache
            .entry_by_ref(key)
            .or_insert_with(init)
            .await
            .into_value()
    }

    /// Downloads an object hosted on an S3-compatible bucket.
    pub async fn download_source(
        &self,
        source: &ObjectStoreSourceConfig,
        key: &ObjectKey,
        destination: &mut File,
    ) -> CacheEntry {
        let object_path = source.object_path(key);
        let bucket = &source.bucket;
        tracing::debug!("Fetching from object store: {} (from {})", object_path, bucket);

        let client = self.get_client(&source.source_key).await;
        let request = client.get_object().bucket(bucket).key(&object_path).send();

        let response = match request.await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(
                    "Skipping response from s3://{}/{}: {}",
                    bucket,
                    object_path,
                    err
                );

                // Check specific error variants first, then fall back to the
                // generic `S3Error` that internally converts things around.
                if let SdkError::ServiceError(service_err) = &err {
                    // Errors and status codes are explained here:
                    // <https://docs.aws.amazon.com/AmazonS3/latest/API/ErrorResponses.html#ErrorCodeList>
                    let status = service_err.raw().status();
                    let code = service_err.err().code();

                    if matches!(status.as_u16(), 401 | 403)
                        || code == Some("AuthorizationHeaderMalformed")
                    {
                        let details = service_err.err().message().unwrap_or_default().to_string();
                        return Err(CacheError::PermissionDenied(details));
                    }
                }

                let err = S3Error::from(err);
                return match &err {
                    S3Error::NoSuchBucket(_) | S3Error::NoSuchKey(_) | S3Error::NotFound(_) => {
                        Err(CacheError::NotFound)
                    }
                    _ if matches!(err.code(), Some("NoSuchBucket" | "NoSuchKey" | "NotFound")) => {
                        Err(CacheError::NotFound)
                    }
                    _ => {
                        tracing::debug!(
                            error = &err as &dyn std::error::Error,
                            "object store request failed: {:?}",
                            err.code(),
                        );
                        Err(CacheError::DownloadError(err.to_string()))
                    }
                };
            }
        };

        let mut body = response.body;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|err| CacheError::download_error(&err))?
        {
            destination.write_all(&chunk).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mediagate_sources::SourceId;

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        mediagate_test::setup();

        let source = ObjectStoreSourceConfig {
            id: SourceId::new("broken"),
            bucket: "mediagate-test".to_owned(),
            prefix: String::new(),
            source_key: Arc::new(ObjectStoreSourceKey {
                region: "auto".to_owned(),
                // nothing listens here, the request must fail locally
                endpoint: Some("http://127.0.0.1:9".parse().unwrap()),
                access_key: "key".to_owned(),
                secret_key: "secret".to_owned(),
            }),
        };

        let downloader = ObjectStoreDownloader::new();
        let tempdir = mediagate_test::tempdir();
        let target_path = tempdir.path().join("myfile");

        let key = ObjectKey::new("does-not-exist.bin").unwrap();
        let mut destination = tokio::fs::File::create(&target_path).await.unwrap();
        let download_status = downloader
            .download_source(&source, &key, &mut destination)
            .await;

        assert!(download_status.is_err());
    }
}
