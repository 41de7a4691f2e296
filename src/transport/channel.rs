use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use super::{SendTimeout, Transport};

/// Transport backed by a bounded `flume` channel.
///
/// The receiving half is handed to whatever actually ships the frames (a
/// socket writer, a file dump, a test). A full channel is backpressure: the
/// send waits up to its timeout and then gives up.
pub struct ChannelTransport {
    frames: flume::Sender<Bytes>,
    connected: AtomicBool,
    speaking: AtomicBool,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, flume::Receiver<Bytes>) {
        let (tx, rx) = flume::bounded(capacity);
        let transport = Self {
            frames: tx,
            connected: AtomicBool::new(true),
            speaking: AtomicBool::new(false),
        };
        (transport, rx)
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.frames.is_disconnected()
    }

    fn set_speaking(&self, speaking: bool) {
        self.speaking.store(speaking, Ordering::Release);
        debug!("🎙️ Speaking: {}", speaking);
    }

    async fn send(&self, frame: Bytes, timeout: Duration) -> Result<(), SendTimeout> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(SendTimeout(timeout));
        }

        match tokio::time::timeout(timeout, self.frames.send_async(frame)).await {
            Ok(Ok(())) => Ok(()),
            // Receptor cerrado: ningún frame será aceptado
            Ok(Err(_)) | Err(_) => Err(SendTimeout(timeout)),
        }
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.speaking.store(false, Ordering::Release);
            info!("🔌 Channel transport disconnected");
        }
    }
}

/// Drains frames into `writer` as `u16` little-endian length + payload.
///
/// Returns the number of frames written once every sender is gone.
pub async fn drain_to<W>(frames: flume::Receiver<Bytes>, writer: &mut W) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Ok(frame) = frames.recv_async().await {
        let len = u16::try_from(frame.len())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "frame too large"))?;
        writer.write_all(&len.to_le_bytes()).await?;
        writer.write_all(&frame).await?;
        written += 1;
    }
    writer.flush().await?;
    Ok(written)
}
