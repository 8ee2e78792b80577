//! Audio error types

use sc_core::{ConfigError, SoundcardFormat};
use thiserror::Error;

/// Backend refused the requested stream parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(SoundcardFormat),

    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u32),

    #[error("Unsupported samplerate: {0}")]
    UnsupportedRate(u32),

    #[error("Unsupported buffer size: {0}")]
    UnsupportedBufferSize(u32),

    #[error("Device locked or unavailable: {0}")]
    DeviceLocked(String),
}

/// Failure while handing a buffer to the device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("Buffer underrun")]
    Underrun,

    #[error("Device suspended")]
    Suspended,

    #[error("Device removed: {0}")]
    DeviceRemoved(String),
}

impl WriteError {
    /// Underrun and suspend are cured by preparing the device again
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Underrun | Self::Suspended)
    }
}

/// Engine level error
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("Device failure: {0}")]
    Device(#[from] WriteError),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
