//! # Audio Module
//!
//! Per-guild playback engine for Open Music.
//!
//! This module provides the core audio functionality including:
//! - One FIFO queue per guild with loop and shuffle
//! - A playback session state machine (idle / playing / paused / stopped)
//! - A real-time decode → encode → deliver pipeline
//! - A drain loop per actively playing guild
//!
//! ## Architecture
//!
//! ### [`registry`] - Guild Registry
//! - Owns every guild's queue and session behind explicit locks
//! - Lazy creation on first enqueue, atomic teardown
//!
//! ### [`queue`] - Queue Management
//! - Ordered entries, the entry currently playing and the loop flag
//!
//! ### [`session`] - Playback Session
//! - Pause / resume / stop transitions and the resources a session owns
//!
//! ### [`pipeline`] - Streaming
//! - ffmpeg decoding, Opus encoding, ticker pacing and bounded delivery
//!
//! ### `scheduler` - Drain Loop
//! - Pops entries and drives the pipeline until the queue empties
//!
//! ## Audio Format
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Bit Depth**: 16-bit signed integers
//! - **Channels**: Stereo (2 channels)
//! - **Frames**: 20ms, Opus encoded

use std::time::Duration;

pub mod decoder;
pub mod encoder;
pub mod pipeline;
pub mod queue;
pub mod registry;
mod scheduler;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use pipeline::{PipelineSettings, StreamingPipeline};
pub use queue::{AudioEntry, QueueSnapshot};
pub use registry::{Enqueued, GuildRegistry};
pub use session::{AudioSession, PlaybackState};

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: usize = 2;
pub const FRAME_DURATION: Duration = Duration::from_millis(20);
/// Samples per channel in one frame (20ms @ 48kHz)
pub const SAMPLES_PER_CHANNEL: usize = 960;
/// Interleaved samples in one frame
pub const FRAME_SAMPLES: usize = SAMPLES_PER_CHANNEL * CHANNELS;
/// Raw s16le bytes in one frame
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;
