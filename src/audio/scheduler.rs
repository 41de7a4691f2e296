use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::pipeline::StreamingPipeline;
use super::queue::AudioEntry;
use super::registry::TenantRecord;
use super::session::AudioSession;
use crate::error::Result;
use crate::sources::SourceResolver;
use crate::transport::Transport;

/// Everything a drain loop needs besides the guild itself.
pub(crate) struct DrainContext {
    pub guild: String,
    pub record: Arc<TenantRecord>,
    pub transport: Arc<dyn Transport>,
    pub resolver: Arc<dyn SourceResolver>,
    pub pipeline: Arc<StreamingPipeline>,
}

/// Plays the guild's queue until it is empty.
///
/// The caller has already claimed the guild. The claim is released by the
/// same pop that finds the queue empty, or explicitly when a transport
/// failure ends the loop with entries left.
pub(crate) async fn drain(ctx: DrainContext) {
    info!("🎶 [{}] Drain loop started", ctx.guild);

    loop {
        let Some(entry) = ctx.record.next_for_drain() else {
            info!("📭 [{}] Queue empty, going idle", ctx.guild);
            break;
        };

        let session = ctx.record.fresh_session();
        session.bind_transport(ctx.transport.clone());

        info!(
            "▶️ [{}] Playing {} (requested by {})",
            ctx.guild,
            entry.audio_ref(),
            entry.requested_by()
        );

        let outcome = AssertUnwindSafe(play_entry(&ctx, &session, &entry))
            .catch_unwind()
            .await;

        ctx.record.finish_current();

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_transport_failure() => {
                warn!("🔌 [{}] Transport failure on {}: {}", ctx.guild, entry.audio_ref(), e);
                session.stop().await;
                ctx.record.release_drain();
                break;
            }
            Ok(Err(e)) => {
                warn!("⏭️ [{}] Skipping {}: {}", ctx.guild, entry.audio_ref(), e);
            }
            Err(_) => {
                error!("💥 [{}] Pipeline panicked on {}", ctx.guild, entry.audio_ref());
                session.stop().await;
            }
        }
    }

    info!("🏁 [{}] Drain loop finished", ctx.guild);
}

async fn play_entry(ctx: &DrainContext, session: &AudioSession, entry: &AudioEntry) -> Result<()> {
    let path = match ctx.resolver.resolve(entry.audio_ref()).await {
        Ok(path) => path,
        Err(e) => {
            session.stop().await;
            return Err(e);
        }
    };

    if session.is_stopped() {
        // Saltada o detenida mientras se resolvía
        return Ok(());
    }

    ctx.pipeline.stream(session, &path).await
}
