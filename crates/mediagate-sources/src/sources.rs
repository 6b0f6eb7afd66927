//! Media source types and related implementations.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

mod clouddrive;
mod objectstore;
mod subprocess;

pub use clouddrive::*;
pub use objectstore::*;
pub use subprocess::*;

/// An identifier for media sources.
///
/// This is essentially a newtype for a string.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SourceId(pub(crate) String);

impl SourceId {
    /// Creates a new [`SourceId`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deref the [`SourceId`] to a `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for an external media source.
///
/// Sources provide the ability to download media objects by key. Their
/// configuration is a combination of the location of the source plus any
/// required authentication.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// An S3-compatible object storage bucket (AWS S3, Cloudflare R2, ...).
    ObjectStore(Arc<ObjectStoreSourceConfig>),
    /// A consumer cloud-drive HTTP API with a per-attempt session.
    CloudDrive(Arc<CloudDriveSourceConfig>),
    /// An external fetch command invoked per object.
    Subprocess(Arc<SubprocessSourceConfig>),
}

impl SourceConfig {
    /// The unique identifier of this source.
    pub fn id(&self) -> &SourceId {
        match self {
            Self::ObjectStore(x) => &x.id,
            Self::CloudDrive(x) => &x.id,
            Self::Subprocess(x) => &x.id,
        }
    }

    /// Name of this source kind, used in logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ObjectStore(..) => "objectstore",
            Self::CloudDrive(..) => "clouddrive",
            Self::Subprocess(..) => "subprocess",
        }
    }
}
