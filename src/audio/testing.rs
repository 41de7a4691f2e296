//! Deterministic stand-ins for the transport, decoder and encoder.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::decoder::{DecodeProcess, DecodeSource, DecodeStream};
use super::encoder::{EncoderFactory, FrameEncoder};
use super::pipeline::PipelineSettings;
use super::FRAME_BYTES;
use crate::error::{PlaybackError, Result};
use crate::transport::{SendTimeout, Transport};

pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        ready_attempts: 3,
        ready_poll_interval: Duration::from_millis(10),
        delivery_timeout: Duration::from_millis(50),
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

pub struct FakeTransport {
    ready: AtomicBool,
    stall: AtomicBool,
    disconnected: AtomicBool,
    speaking: Mutex<Vec<bool>>,
    frames: Mutex<Vec<Bytes>>,
}

impl FakeTransport {
    pub fn ready() -> Self {
        Self {
            ready: AtomicBool::new(true),
            stall: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            speaking: Mutex::new(Vec::new()),
            frames: Mutex::new(Vec::new()),
        }
    }

    pub fn never_ready() -> Self {
        let transport = Self::ready();
        transport.ready.store(false, Ordering::SeqCst);
        transport
    }

    /// Accepts no frame: every send runs into its timeout.
    pub fn stalled() -> Self {
        let transport = Self::ready();
        transport.stall.store(true, Ordering::SeqCst);
        transport
    }

    pub fn speaking_calls(&self) -> Vec<bool> {
        self.speaking.lock().clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn set_speaking(&self, speaking: bool) {
        self.speaking.lock().push(speaking);
    }

    async fn send(&self, frame: Bytes, timeout: Duration) -> std::result::Result<(), SendTimeout> {
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(timeout).await;
            return Err(SendTimeout(timeout));
        }
        self.frames.lock().push(frame);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct FakeProcess {
    running: Arc<AtomicBool>,
    kills: Arc<AtomicUsize>,
    exit_ok: bool,
}

impl FakeProcess {
    pub fn running() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            kills: Arc::new(AtomicUsize::new(0)),
            exit_ok: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecodeProcess for FakeProcess {
    async fn kill(&mut self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    async fn wait(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if self.exit_ok {
            Ok(())
        } else {
            Err(PlaybackError::DecodeFailure("exit status 1".to_string()))
        }
    }
}

/// Yields `frames` frames of PCM, or never ends when `None`.
pub struct FakeDecoder {
    frames: Option<usize>,
    fail_start: bool,
    exit_ok: bool,
    started: Mutex<Vec<PathBuf>>,
    processes: Mutex<Vec<FakeProcess>>,
}

impl FakeDecoder {
    pub fn finite(frames: usize) -> Self {
        Self {
            frames: Some(frames),
            fail_start: false,
            exit_ok: true,
            started: Mutex::new(Vec::new()),
            processes: Mutex::new(Vec::new()),
        }
    }

    pub fn endless() -> Self {
        Self {
            frames: None,
            ..Self::finite(0)
        }
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::finite(0)
        }
    }

    pub fn abnormal_exit(frames: usize) -> Self {
        Self {
            exit_ok: false,
            ..Self::finite(frames)
        }
    }

    pub fn started(&self) -> Vec<PathBuf> {
        self.started.lock().clone()
    }

    pub fn any_running(&self) -> bool {
        self.processes.lock().iter().any(FakeProcess::is_running)
    }
}

#[async_trait]
impl DecodeSource for FakeDecoder {
    async fn start(&self, path: &Path) -> Result<DecodeStream> {
        if self.fail_start {
            return Err(PlaybackError::DecodeFailure("spawn failed".to_string()));
        }
        self.started.lock().push(path.to_path_buf());

        let mut process = FakeProcess::running();
        process.exit_ok = self.exit_ok;
        self.processes.lock().push(process.clone());

        let reader: super::decoder::PcmReader = match self.frames {
            Some(frames) => Box::new(std::io::Cursor::new(vec![1u8; frames * FRAME_BYTES])),
            None => Box::new(tokio::io::repeat(1)),
        };

        Ok(DecodeStream {
            reader,
            process: Box::new(process),
        })
    }
}

pub struct FakeEncoderFactory {
    fail: bool,
    /// The next encoder created panics on its first frame
    panic_next: AtomicBool,
}

impl FakeEncoderFactory {
    pub fn working() -> Self {
        Self {
            fail: false,
            panic_next: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::working()
        }
    }

    pub fn panicking_once() -> Self {
        let factory = Self::working();
        factory.panic_next.store(true, Ordering::SeqCst);
        factory
    }

    pub fn arm_panic(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }
}

impl EncoderFactory for FakeEncoderFactory {
    fn create(&self) -> Result<Box<dyn FrameEncoder>> {
        Ok(Box::new(FakeEncoder {
            fail: self.fail,
            panic: self.panic_next.swap(false, Ordering::SeqCst),
        }))
    }
}

struct FakeEncoder {
    fail: bool,
    panic: bool,
}

impl FrameEncoder for FakeEncoder {
    fn encode(&mut self, pcm: &[i16]) -> Result<Bytes> {
        if self.panic {
            panic!("encoder blew up");
        }
        if self.fail {
            return Err(PlaybackError::EncodeFailure("rejected".to_string()));
        }
        Ok(Bytes::from(pcm.len().to_le_bytes().to_vec()))
    }
}
