//! The shared state behind all gateway endpoints.

use std::sync::Arc;

use anyhow::{Context, Result};

use mediagate_service::caching::MediaCache;
use mediagate_service::chatlog::ChatLog;
use mediagate_service::config::Config;
use mediagate_service::download::DownloadService;

use crate::auth::AuthContext;

struct ServiceInner {
    config: Config,
    auth: AuthContext,
    media: MediaCache,
    chat: ChatLog,
}

/// Cloneable handle to the gateway services, used as the axum router state.
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<ServiceInner>,
}

impl std::fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceState").finish()
    }
}

impl ServiceState {
    /// Creates all services from the configuration.
    ///
    /// This also performs the chat-log bootstrap: a missing local chat log is
    /// downloaded before the server starts taking requests. A failed
    /// bootstrap is logged and tolerated; the chat endpoint keeps failing
    /// until the file exists while media serving works normally.
    pub async fn create(config: Config) -> Result<Self> {
        let downloader = DownloadService::new(&config);
        let media = MediaCache::new(&config, downloader)
            .context("failed to create the media cache directory")?;

        let auth = AuthContext::new(config.auth.clone());
        let chat = ChatLog::new(config.chat.clone());

        if let Err(error) = chat.bootstrap().await {
            tracing::error!("failed to download the chat log: {error:#}");
        }

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                auth,
                media,
                chat,
            }),
        })
    }

    /// The loaded configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The token issuer and verifier.
    pub fn auth(&self) -> &AuthContext {
        &self.inner.auth
    }

    /// The media cache resolver.
    pub fn media_cache(&self) -> &MediaCache {
        &self.inner.media
    }

    /// The chat log.
    pub fn chat_log(&self) -> &ChatLog {
        &self.inner.chat
    }
}
