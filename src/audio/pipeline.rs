use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, ErrorKind};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decoder::DecodeSource;
use super::encoder::EncoderFactory;
use super::session::AudioSession;
use super::{FRAME_BYTES, FRAME_DURATION, FRAME_SAMPLES};
use crate::config::Config;
use crate::error::{PlaybackError, Result};
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Readiness polls before giving up on the transport
    pub ready_attempts: u32,
    pub ready_poll_interval: Duration,
    /// Bound on delivering one frame
    pub delivery_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            ready_attempts: 20,
            ready_poll_interval: Duration::from_millis(100),
            delivery_timeout: Duration::from_millis(200),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        let poll = config.ready_poll_interval.max(Duration::from_millis(1));
        let attempts = (config.ready_timeout.as_millis() / poll.as_millis()).max(1);
        Self {
            ready_attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            ready_poll_interval: poll,
            delivery_timeout: config.delivery_timeout,
        }
    }
}

/// Lowers the speaking indicator on every exit path.
struct SpeakingGuard<'a>(&'a AudioSession);

impl Drop for SpeakingGuard<'_> {
    fn drop(&mut self) {
        self.0.clear_speaking();
    }
}

/// Streams one local file into a session's transport as paced, encoded frames.
pub struct StreamingPipeline {
    decoder: Arc<dyn DecodeSource>,
    encoders: Arc<dyn EncoderFactory>,
    settings: PipelineSettings,
}

impl StreamingPipeline {
    pub fn new(
        decoder: Arc<dyn DecodeSource>,
        encoders: Arc<dyn EncoderFactory>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            decoder,
            encoders,
            settings,
        }
    }

    /// Plays `path` until end of input, a stop, or an error.
    ///
    /// The session is stopped before this returns, whatever the outcome, so
    /// the decode process, the speaking flag and the buffers never outlive
    /// the attempt. A stop is a clean exit, not an error.
    pub async fn stream(&self, session: &AudioSession, path: &Path) -> Result<()> {
        let result = self.run(session, path).await;
        session.stop().await;
        result
    }

    async fn run(&self, session: &AudioSession, path: &Path) -> Result<()> {
        let stop = session.stop_signal();
        let transport = session
            .transport()
            .ok_or(PlaybackError::TransportNotReady(Duration::ZERO))?;

        if !self.wait_ready(transport.as_ref(), &stop).await? {
            return Ok(());
        }

        if !session.start_speaking() {
            return Ok(());
        }
        let _speaking = SpeakingGuard(session);

        let stream = self.decoder.start(path).await?;
        let mut reader = stream.reader;
        if let Err(mut process) = session.attach_process(stream.process) {
            // Detenida mientras ffmpeg arrancaba
            process.kill().await;
            return Ok(());
        }

        let mut encoder = self.encoders.create()?;
        let mut raw = vec![0u8; FRAME_BYTES];
        let mut pcm = vec![0i16; FRAME_SAMPLES];

        let mut ticker = interval(FRAME_DURATION);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let timeout = self.settings.delivery_timeout;
        let mut frames: u64 = 0;

        info!("🎵 Streaming {} (session {})", path.display(), session.id());

        loop {
            if let Some(resume) = session.resume_signal() {
                debug!("⏸️ Waiting for resume (session {})", session.id());
                tokio::select! {
                    _ = resume.cancelled() => {
                        ticker.reset();
                        continue;
                    }
                    _ = stop.cancelled() => return Ok(()),
                }
            }

            let read = tokio::select! {
                read = reader.read_exact(&mut raw) => read,
                _ = stop.cancelled() => return Ok(()),
            };
            match read {
                Ok(_) => {}
                // Un frame final incompleto también es fin de entrada
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    if stop.is_cancelled() {
                        return Ok(());
                    }
                    return Err(PlaybackError::DecodeFailure(format!("reading PCM: {}", e)));
                }
            }

            for (sample, bytes) in pcm.iter_mut().zip(raw.chunks_exact(2)) {
                *sample = i16::from_le_bytes([bytes[0], bytes[1]]);
            }

            let frame = encoder.encode(&pcm)?;

            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.cancelled() => return Ok(()),
            }

            if frame.is_empty() {
                continue;
            }

            tokio::select! {
                biased;
                _ = stop.cancelled() => return Ok(()),
                sent = tokio::time::timeout(timeout, transport.send(frame, timeout)) => {
                    match sent {
                        Ok(Ok(())) => frames += 1,
                        Ok(Err(_)) | Err(_) => {
                            warn!("⏱️ Frame {} not accepted within {:?}", frames + 1, timeout);
                            return Err(PlaybackError::DeliveryTimeout(timeout));
                        }
                    }
                }
            }
        }

        if stop.is_cancelled() {
            return Ok(());
        }

        if let Some(mut process) = session.take_process() {
            process.wait().await?;
        }

        info!(
            "✅ Finished {} after {} frames (~{}s)",
            path.display(),
            frames,
            frames * FRAME_DURATION.as_millis() as u64 / 1000
        );
        Ok(())
    }

    /// Polls readiness. `Ok(false)` means the session was stopped meanwhile.
    async fn wait_ready(&self, transport: &dyn Transport, stop: &CancellationToken) -> Result<bool> {
        for attempt in 0..=self.settings.ready_attempts {
            if transport.is_ready() {
                if attempt > 0 {
                    debug!("🔗 Transport ready after {} polls", attempt);
                }
                return Ok(true);
            }
            if attempt == self.settings.ready_attempts {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.ready_poll_interval) => {}
                _ = stop.cancelled() => return Ok(false),
            }
        }

        Err(PlaybackError::TransportNotReady(
            self.settings.ready_poll_interval * self.settings.ready_attempts,
        ))
    }
}
