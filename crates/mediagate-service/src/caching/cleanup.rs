use std::time::SystemTime;

use anyhow::{Context, Result};

use crate::config::Config;

#[derive(Debug, Default)]
struct CleanupStats {
    removed_files: usize,
    removed_bytes: u64,
    retained_files: usize,
}

/// Entry function for the cleanup command.
///
/// Removes cache files whose last modification is older than the configured
/// eviction window. The running server evicts on its own timers; this exists
/// for cache directories left behind by a previous process, which has no
/// in-memory timer index to resume from.
///
/// If `dry_run` is `true`, no files will actually be deleted.
pub fn cleanup(config: &Config, dry_run: bool) -> Result<()> {
    tracing::info!("Cleaning up cache directory {}", config.cache_dir.display());

    let mut stats = CleanupStats::default();
    let entries = std::fs::read_dir(&config.cache_dir)
        .with_context(|| format!("failed to read {}", config.cache_dir.display()))?;

    for entry in entries {
        let entry = entry.context("failed to read cache directory entry")?;
        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(err) => {
                let dynerr: &dyn std::error::Error = &err;
                tracing::warn!(error = dynerr, "failed to stat cache entry");
                continue;
            }
        };

        let expired = metadata
            .modified()
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .is_some_and(|idle| idle > config.eviction_after);

        if !expired {
            stats.retained_files += 1;
            continue;
        }

        if !dry_run {
            if let Err(err) = std::fs::remove_file(entry.path()) {
                let dynerr: &dyn std::error::Error = &err;
                tracing::warn!(error = dynerr, "failed to remove expired cache entry");
                continue;
            }
        }
        stats.removed_files += 1;
        stats.removed_bytes += metadata.len();
    }

    tracing::info!(
        "Cleanup done: removed {} file(s) ({} bytes), retained {}",
        stats.removed_files,
        stats.removed_bytes,
        stats.retained_files
    );

    Ok(())
}
