//! Error types for the playback engine.
//!
//! Every failure a queue operation or a streaming attempt can produce is one
//! variant of [`PlaybackError`]. None of them is fatal to the process.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Operation on a guild that has no queue
    #[error("No queue for guild {0}")]
    NotFound(String),

    /// The transport never reported ready within the bound
    #[error("Transport not ready after {0:?}")]
    TransportNotReady(Duration),

    /// Decoder failed to start or exited abnormally
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    /// Codec rejected a frame
    #[error("Encode failure: {0}")]
    EncodeFailure(String),

    /// Transport accepted no frame within the bound
    #[error("Delivery timeout: no frame accepted within {0:?}")]
    DeliveryTimeout(Duration),

    /// Resolver could not produce a local file
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),
}

impl PlaybackError {
    /// Transport-level failures end the drain loop and leave the guild idle.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            PlaybackError::TransportNotReady(_) | PlaybackError::DeliveryTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
