use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::SourceResolver;
use crate::error::{PlaybackError, Result};

const CACHE_EXTENSION: &str = "opus";

/// Resolves against the shared on-disk audio cache.
///
/// An existing file path resolves to itself; anything else is taken as a
/// cache id stored at `<cache_dir>/<id>.opus`. Whoever downloads into the
/// cache owns it; this resolver only reads.
pub struct LocalCacheResolver {
    cache_dir: PathBuf,
}

impl LocalCacheResolver {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_path(&self, id: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", id, CACHE_EXTENSION))
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

#[async_trait]
impl SourceResolver for LocalCacheResolver {
    async fn resolve(&self, audio_ref: &str) -> Result<PathBuf> {
        let direct = PathBuf::from(audio_ref);
        if is_file(&direct).await {
            debug!("📁 Using file {}", direct.display());
            return Ok(direct);
        }

        let cached = self.cache_path(audio_ref);
        if is_file(&cached).await {
            debug!("📦 Cache hit for {}", audio_ref);
            return Ok(cached);
        }

        warn!("📭 {} not found in cache {}", audio_ref, self.cache_dir.display());
        Err(PlaybackError::SourceUnavailable(format!(
            "{} is not a file and not cached at {}",
            audio_ref,
            cached.display()
        )))
    }
}
