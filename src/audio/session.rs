use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::decoder::DecodeProcess;
use crate::transport::Transport;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No decode process bound yet
    Idle,
    Playing,
    Paused,
    /// Terminal
    Stopped,
}

struct SessionInner {
    state: PlaybackState,
    transport: Option<Arc<dyn Transport>>,
    process: Option<Box<dyn DecodeProcess>>,
    resume: Option<CancellationToken>,
    speaking: bool,
}

/// One playback session of a guild.
///
/// Every transition runs under `inner`, which is never held across an
/// await. `stop` is terminal: a stopped session is replaced, not reused.
pub struct AudioSession {
    id: u64,
    inner: Mutex<SessionInner>,
    stop: CancellationToken,
}

impl AudioSession {
    pub fn new() -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            inner: Mutex::new(SessionInner {
                state: PlaybackState::Idle,
                transport: None,
                process: None,
                resume: None,
                speaking: false,
            }),
            stop: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == PlaybackState::Stopped
    }

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.inner.lock().transport.clone()
    }

    /// Binds the outbound transport. Refused once stopped.
    pub fn bind_transport(&self, transport: Arc<dyn Transport>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == PlaybackState::Stopped {
            return false;
        }
        inner.transport = Some(transport);
        true
    }

    /// Hands the decode process to the session and enters `Playing`.
    ///
    /// A session stopped in the meantime gives the process back so the
    /// caller can kill it.
    pub fn attach_process(
        &self,
        process: Box<dyn DecodeProcess>,
    ) -> std::result::Result<(), Box<dyn DecodeProcess>> {
        let mut inner = self.inner.lock();
        if inner.state == PlaybackState::Stopped {
            return Err(process);
        }
        inner.process = Some(process);
        if inner.state == PlaybackState::Idle {
            inner.state = PlaybackState::Playing;
        }
        Ok(())
    }

    /// Takes the decode process back after end of input, to check its exit status.
    pub fn take_process(&self) -> Option<Box<dyn DecodeProcess>> {
        self.inner.lock().process.take()
    }

    /// Pausa la reproducción. Solo tiene efecto desde `Playing`.
    pub fn pause(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != PlaybackState::Playing {
            return false;
        }
        inner.state = PlaybackState::Paused;
        inner.resume = Some(CancellationToken::new());
        info!("⏸️ Session {} paused", self.id);
        true
    }

    /// Reanuda la reproducción. Solo tiene efecto desde `Paused`.
    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != PlaybackState::Paused {
            return false;
        }
        if let Some(resume) = inner.resume.take() {
            resume.cancel();
        }
        inner.state = PlaybackState::Playing;
        info!("▶️ Session {} resumed", self.id);
        true
    }

    /// Signal released by the next `resume`; `None` unless paused.
    pub fn resume_signal(&self) -> Option<CancellationToken> {
        self.inner.lock().resume.clone()
    }

    /// Fires once, on the first `stop`.
    pub fn stop_signal(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Raises the speaking indicator. Returns `false` once stopped.
    pub fn start_speaking(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == PlaybackState::Stopped {
            return false;
        }
        let Some(transport) = inner.transport.clone() else {
            return false;
        };
        inner.speaking = true;
        transport.set_speaking(true);
        true
    }

    /// Lowers the speaking indicator if it is up.
    pub fn clear_speaking(&self) {
        let mut inner = self.inner.lock();
        Self::lower_speaking(&mut inner);
    }

    fn lower_speaking(inner: &mut SessionInner) {
        if std::mem::take(&mut inner.speaking) {
            if let Some(transport) = &inner.transport {
                transport.set_speaking(false);
            }
        }
    }

    /// Terminal transition.
    ///
    /// Wakes every waiter, kills and reaps the decode process and lowers the
    /// speaking indicator. Returns `false` if the session was already stopped.
    pub async fn stop(&self) -> bool {
        let process = {
            let mut inner = self.inner.lock();
            if inner.state == PlaybackState::Stopped {
                return false;
            }
            inner.state = PlaybackState::Stopped;
            inner.resume = None;
            self.stop.cancel();
            Self::lower_speaking(&mut inner);
            inner.process.take()
        };

        if let Some(mut process) = process {
            process.kill().await;
            debug!("🛑 Decoder of session {} reaped", self.id);
        }

        info!("⏹️ Session {} stopped", self.id);
        true
    }
}

impl Default for AudioSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AudioSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
