use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ObjectKey, SourceId};

/// Configuration for an S3-compatible object storage source.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ObjectStoreSourceConfig {
    /// Unique source identifier.
    pub id: SourceId,

    /// Name of the bucket holding the media objects.
    pub bucket: String,

    /// A path prefix prepended to every object key.
    #[serde(default)]
    pub prefix: String,

    /// Credentials and endpoint for the bucket.
    pub source_key: Arc<ObjectStoreSourceKey>,
}

impl ObjectStoreSourceConfig {
    /// The full object path for `key`, including the configured prefix.
    pub fn object_path(&self, key: &ObjectKey) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            key.as_str().to_owned()
        } else {
            format!("{}/{}", prefix, key)
        }
    }
}

/// Credentials and endpoint of an object storage bucket.
///
/// This is the cache key for the per-bucket client, hence `Hash`/`Eq`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct ObjectStoreSourceKey {
    /// The bucket region. S3-compatible stores such as R2 use `auto`.
    #[serde(default = "default_region")]
    pub region: String,

    /// A custom endpoint URL for S3-compatible stores.
    ///
    /// Leaving this unset uses the regular AWS endpoint for the region.
    #[serde(default)]
    pub endpoint: Option<Url>,

    /// The access key id.
    pub access_key: String,

    /// The secret access key.
    pub secret_key: String,
}

fn default_region() -> String {
    "auto".to_owned()
}
