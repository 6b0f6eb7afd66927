//! The chat history log.
//!
//! The log is a single JSON array of messages on local disk. If it is missing
//! at startup it is downloaded once from a configured remote URL; that
//! download is awaited and its failure logged, never fired and forgotten.

use std::path::Path;

use anyhow::{Context, Result};
use futures::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::config::ChatConfig;

/// One page of chat messages, oldest first within the page.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatPage {
    pub messages: Vec<Value>,
    pub page: usize,
    pub total_pages: usize,
}

/// Handle to the on-disk chat log.
#[derive(Debug, Clone)]
pub struct ChatLog {
    config: ChatConfig,
}

impl ChatLog {
    pub fn new(config: ChatConfig) -> Self {
        Self { config }
    }

    /// Page size used when a request does not specify one.
    pub fn default_page_size(&self) -> usize {
        self.config.default_page_size
    }

    /// Downloads the chat log with a fresh HTTP client if the local file is
    /// missing.
    pub async fn bootstrap(&self) -> Result<bool> {
        self.ensure_local(&reqwest::Client::new()).await
    }

    /// Downloads the chat log if the local file is missing.
    ///
    /// Returns `Ok(false)` when nothing had to be done (file already present
    /// or no remote URL configured).
    pub async fn ensure_local(&self, client: &reqwest::Client) -> Result<bool> {
        if self.config.local_path.exists() {
            return Ok(false);
        }

        let Some(url) = &self.config.remote_url else {
            tracing::info!(
                "chat log {} missing and no remote URL configured",
                self.config.local_path.display()
            );
            return Ok(false);
        };

        tracing::info!("chat log not found, downloading from remote URL");

        let response = client
            .get(url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .context("chat log request failed")?;

        let parent = self.config.local_path.parent().unwrap_or(Path::new("."));
        let temp_file = NamedTempFile::new_in(parent).context("failed to create temp file")?;
        let mut file = tokio::fs::File::create(temp_file.path())
            .await
            .context("failed to open temp file")?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("chat log download interrupted")?;
            file.write_all(&chunk)
                .await
                .context("failed writing chat log")?;
        }
        file.flush().await.context("failed writing chat log")?;
        drop(file);

        temp_file
            .persist(&self.config.local_path)
            .context("failed to store chat log")?;

        tracing::info!("chat log downloaded and saved");
        Ok(true)
    }

    /// Reads and parses the whole chat log.
    pub fn load(&self) -> Result<Vec<Value>> {
        let raw = std::fs::read(&self.config.local_path).with_context(|| {
            format!("failed to read {}", self.config.local_path.display())
        })?;
        serde_json::from_slice(&raw).context("chat log is not a JSON array")
    }

    /// Loads the requested page of the chat log.
    pub fn page(&self, page: usize, page_size: usize) -> Result<ChatPage> {
        let messages = self.load()?;
        Ok(paginate(&messages, page, page_size))
    }
}

/// Slices one page out of the chat log, counting pages from the newest
/// messages backwards.
///
/// Page 1 holds the last `page_size` messages, page 2 the `page_size` before
/// those, and so on. Within a page, messages stay in chronological order.
pub fn paginate(messages: &[Value], page: usize, page_size: usize) -> ChatPage {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total = messages.len();
    let total_pages = total.div_ceil(page_size);

    let end = total.saturating_sub((page - 1) * page_size);
    let start = total.saturating_sub(page * page_size);

    ChatPage {
        messages: messages[start..end].to_vec(),
        page,
        total_pages,
    }
}
