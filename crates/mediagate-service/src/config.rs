use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;
use url::Url;

use mediagate_sources::SourceConfig;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the gateway.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Admin credentials and token settings for the login endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Username accepted by the login endpoint.
    pub username: String,
    /// Password accepted by the login endpoint.
    ///
    /// An empty password disables login entirely.
    pub password: String,
    /// Secret used to sign and verify session tokens.
    pub secret: String,
    /// Validity of an issued session token.
    #[serde(with = "humantime_serde")]
    pub token_expiry: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            username: "admin".to_owned(),
            password: String::new(),
            secret: String::new(),
            token_expiry: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Location and paging of the chat log.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Local path of the chat log JSON file.
    pub local_path: PathBuf,
    /// Remote URL to download the chat log from when the local file is
    /// missing at startup.
    pub remote_url: Option<Url>,
    /// Page size used when the request does not specify one.
    pub default_page_size: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            local_path: PathBuf::from("chat.json"),
            remote_url: None,
            default_page_size: 50,
        }
    }
}

/// The main gateway configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host and port of the HTTP server.
    pub bind: String,

    /// Directory to use for storing cached media. Will be created if it does
    /// not exist.
    pub cache_dir: PathBuf,

    /// Idle duration after which an unaccessed cached file is deleted.
    ///
    /// Every access to an entry resets its window.
    #[serde(with = "humantime_serde")]
    pub eviction_after: Duration,

    /// Maximum number of fetch attempts per source.
    pub max_retries: usize,

    /// Fixed delay between fetch attempts.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// The timeout for a single download attempt.
    #[serde(with = "humantime_serde")]
    pub download_timeout: Duration,

    /// The timeout for establishing an outbound connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Login credentials and token settings.
    pub auth: AuthConfig,

    /// Chat log location and paging.
    pub chat: ChatConfig,

    /// Origins allowed to call the API from a browser.
    pub allowed_origins: Vec<String>,

    /// The media sources, tried in order on a cache miss.
    pub sources: Arc<[SourceConfig]>,

    /// Logging level and format.
    pub logging: Logging,
}

/// Default value for the "cache_dir" configuration.
fn default_cache_dir() -> PathBuf {
    env::temp_dir().join("mediagate")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1:3333".to_owned(),
            cache_dir: default_cache_dir(),
            eviction_after: Duration::from_secs(10),
            max_retries: 3,
            retry_backoff: Duration::from_secs(3),
            download_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            auth: AuthConfig::default(),
            chat: ChatConfig::default(),
            allowed_origins: Vec::new(),
            sources: Arc::from(vec![]),
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from `path`, or the defaults if no path is
    /// given.
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

fn deserialize_level_filter<'de, D>(deserializer: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    text.parse().map_err(de::Error::custom)
}
