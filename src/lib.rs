//! Per-guild audio playback engine: queues, sessions and a paced Opus
//! streaming pipeline behind a small transport trait.

pub mod audio;
pub mod config;
pub mod error;
pub mod sources;
pub mod transport;
