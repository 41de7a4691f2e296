//! # Transport
//!
//! Outbound side of the streaming pipeline. Any voice backend that can report
//! readiness, toggle its speaking indicator, accept encoded frames with a
//! bounded wait and disconnect satisfies [`Transport`].

pub mod channel;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

pub use channel::ChannelTransport;

/// The transport did not accept a frame within the given bound.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Frame not accepted within {0:?}")]
pub struct SendTimeout(pub Duration);

#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the connection can carry audio right now
    fn is_ready(&self) -> bool;

    /// Toggles the speaking indicator. Must not block.
    fn set_speaking(&self, speaking: bool);

    /// Sends one encoded frame, waiting at most `timeout` for the transport to take it
    async fn send(&self, frame: Bytes, timeout: Duration) -> Result<(), SendTimeout>;

    async fn disconnect(&self);
}
