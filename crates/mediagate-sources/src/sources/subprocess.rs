use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::SourceId;

/// Configuration for a subprocess source.
///
/// Fetches are delegated to an external command which is invoked as
/// `<command> <args>... <key> <destination>` and signals the outcome through
/// its exit status. Exit code 44 means the object does not exist; any other
/// non-zero exit is treated as a failed download.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SubprocessSourceConfig {
    /// Unique source identifier.
    pub id: SourceId,

    /// The fetch command binary.
    pub command: PathBuf,

    /// Fixed arguments placed before the key and destination.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the fetch command.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}
