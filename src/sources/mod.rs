pub mod local_cache;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::Result;

pub use local_cache::LocalCacheResolver;

/// Turns an audio reference into a decodable local file.
///
/// Resolution may block (a fetch, a download) and may fail with
/// [`PlaybackError::SourceUnavailable`](crate::error::PlaybackError::SourceUnavailable).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, audio_ref: &str) -> Result<PathBuf>;
}
