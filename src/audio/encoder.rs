use audiopus::{coder::Encoder, Application, Bitrate, Channels, SampleRate};
use bytes::Bytes;
use tracing::debug;

use crate::error::{PlaybackError, Result};

/// Upper bound for one encoded Opus packet
pub const MAX_PACKET_SIZE: usize = 4000;

/// Compresses one PCM frame at a time.
pub trait FrameEncoder: Send {
    fn encode(&mut self, pcm: &[i16]) -> Result<Bytes>;
}

/// Builds one encoder per streaming attempt.
pub trait EncoderFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn FrameEncoder>>;
}

/// Opus at 48 kHz stereo, tuned for music.
pub struct OpusEncoderFactory {
    bitrate: u32,
}

impl OpusEncoderFactory {
    pub fn new(bitrate: u32) -> Self {
        Self { bitrate }
    }
}

impl EncoderFactory for OpusEncoderFactory {
    fn create(&self) -> Result<Box<dyn FrameEncoder>> {
        let mut encoder = Encoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Audio)
            .map_err(|e| PlaybackError::EncodeFailure(format!("creating opus encoder: {}", e)))?;

        let bitrate = i32::try_from(self.bitrate)
            .map_err(|_| PlaybackError::EncodeFailure(format!("bitrate {} out of range", self.bitrate)))?;
        encoder
            .set_bitrate(Bitrate::BitsPerSecond(bitrate))
            .map_err(|e| PlaybackError::EncodeFailure(format!("setting bitrate: {}", e)))?;

        debug!("🎚️ Opus encoder ready at {}kbps", self.bitrate / 1000);

        Ok(Box::new(OpusFrameEncoder {
            encoder,
            packet: vec![0u8; MAX_PACKET_SIZE],
        }))
    }
}

struct OpusFrameEncoder {
    encoder: Encoder,
    packet: Vec<u8>,
}

impl FrameEncoder for OpusFrameEncoder {
    fn encode(&mut self, pcm: &[i16]) -> Result<Bytes> {
        let len = self
            .encoder
            .encode(pcm, &mut self.packet)
            .map_err(|e| PlaybackError::EncodeFailure(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&self.packet[..len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FRAME_SAMPLES;

    #[test]
    fn test_opus_encodes_silence() {
        let mut encoder = OpusEncoderFactory::new(96_000).create().unwrap();
        let frame = encoder.encode(&vec![0i16; FRAME_SAMPLES]).unwrap();

        assert!(!frame.is_empty());
        assert!(frame.len() <= MAX_PACKET_SIZE);
    }

    #[test]
    fn test_wrong_frame_size_is_encode_failure() {
        let mut encoder = OpusEncoderFactory::new(96_000).create().unwrap();
        let result = encoder.encode(&[0i16; 7]);

        assert!(matches!(result, Err(PlaybackError::EncodeFailure(_))));
    }
}
