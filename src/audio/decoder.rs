use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::{debug, error, info};

use super::{CHANNELS, SAMPLE_RATE};
use crate::error::{PlaybackError, Result};

pub type PcmReader = Box<dyn AsyncRead + Send + Unpin>;

/// Handle on a running decode process.
#[async_trait]
pub trait DecodeProcess: Send {
    /// Kills the process and waits until it has exited
    async fn kill(&mut self);

    /// Waits for a natural exit. An abnormal status is a [`PlaybackError::DecodeFailure`].
    async fn wait(&mut self) -> Result<()>;
}

/// Raw interleaved s16le PCM plus the process producing it.
pub struct DecodeStream {
    pub reader: PcmReader,
    pub process: Box<dyn DecodeProcess>,
}

/// Starts decoders for local files.
#[async_trait]
pub trait DecodeSource: Send + Sync {
    async fn start(&self, path: &Path) -> Result<DecodeStream>;
}

/// Decodes through an `ffmpeg` subprocess writing PCM to its stdout.
pub struct FfmpegDecoder {
    binary: PathBuf,
}

impl FfmpegDecoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Verifica que ffmpeg esté disponible
    pub async fn verify(&self) -> anyhow::Result<()> {
        let output = Command::new(&self.binary).arg("-version").output().await;

        match output {
            Ok(output) if output.status.success() => {
                info!("✅ ffmpeg disponible: {}", self.binary.display());
                Ok(())
            }
            _ => {
                error!("❌ ffmpeg no encontrado. Instala con: sudo apt install ffmpeg");
                anyhow::bail!("ffmpeg no disponible en {}", self.binary.display());
            }
        }
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(path)
            .args(["-f", "s16le", "-ar"])
            .arg(SAMPLE_RATE.to_string())
            .arg("-ac")
            .arg(CHANNELS.to_string())
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl DecodeSource for FfmpegDecoder {
    async fn start(&self, path: &Path) -> Result<DecodeStream> {
        let mut child = self.command(path).spawn().map_err(|e| {
            PlaybackError::DecodeFailure(format!(
                "failed to start {}: {}",
                self.binary.display(),
                e
            ))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            PlaybackError::DecodeFailure("decoder stdout was not captured".to_string())
        })?;

        debug!("🎛️ ffmpeg started for {} (pid {:?})", path.display(), child.id());

        Ok(DecodeStream {
            reader: Box::new(stdout),
            process: Box::new(FfmpegProcess { child }),
        })
    }
}

struct FfmpegProcess {
    child: Child,
}

#[async_trait]
impl DecodeProcess for FfmpegProcess {
    async fn kill(&mut self) {
        // Ya terminado: kill falla y no hay nada que hacer
        if let Err(e) = self.child.kill().await {
            debug!("ffmpeg kill: {}", e);
        }
    }

    async fn wait(&mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| PlaybackError::DecodeFailure(format!("waiting for ffmpeg: {}", e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(PlaybackError::DecodeFailure(format!("ffmpeg exited with {}", status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ffmpeg_arguments() {
        let decoder = FfmpegDecoder::new("ffmpeg");
        let cmd = decoder.command(Path::new("cache/abc.opus"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "-hide_banner", "-loglevel", "error", "-i", "cache/abc.opus", "-f", "s16le",
                "-ar", "48000", "-ac", "2", "pipe:1",
            ]
        );
    }

    #[tokio::test]
    async fn test_session_stop_kills_real_subprocess() {
        use crate::audio::AudioSession;
        use std::time::Duration;
        use tokio::io::AsyncReadExt;

        // `yes` ignora los argumentos de ffmpeg y escribe sin parar
        let decoder = FfmpegDecoder::new("yes");
        let stream = decoder.start(Path::new("cache/abc.opus")).await.unwrap();
        let mut reader = stream.reader;
        let session = AudioSession::new();
        assert!(session.attach_process(stream.process).is_ok());

        let mut chunk = [0u8; 64];
        reader.read_exact(&mut chunk).await.unwrap();

        assert!(session.stop().await);

        // Killed and reaped: stdout reaches EOF once the pipe is drained
        let mut rest = Vec::new();
        let drained =
            tokio::time::timeout(Duration::from_secs(2), reader.read_to_end(&mut rest)).await;
        assert!(drained.is_ok());
        assert!(session.take_process().is_none());
    }

    #[tokio::test]
    async fn test_missing_binary_is_decode_failure() {
        let decoder = FfmpegDecoder::new("/nonexistent/ffmpeg-binary");
        let result = decoder.start(Path::new("whatever.opus")).await;

        assert!(matches!(result, Err(PlaybackError::DecodeFailure(_))));
    }
}
