use serde::{Deserialize, Serialize};
use url::Url;

use crate::SourceId;

/// Configuration for a consumer cloud-drive source.
///
/// The drive API requires a login handshake before every fetch. The resulting
/// session token authorizes a folder lookup by name, a file lookup within
/// that folder, and the content download itself. Sessions are closed after
/// every attempt.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CloudDriveSourceConfig {
    /// Unique source identifier.
    pub id: SourceId,

    /// Base URL of the drive API.
    pub base_url: Url,

    /// Account username for the login handshake.
    pub username: String,

    /// Account password for the login handshake.
    pub password: String,

    /// Name of the drive folder holding the media files.
    pub folder: String,
}
