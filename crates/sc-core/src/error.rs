//! Configuration error types

use thiserror::Error;

/// Invalid configuration or preset combination.
///
/// Always returned to the immediate caller, never clamped.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Delay factor must be a positive finite number, got {0}")]
    InvalidDelayFactor(f64),

    #[error("Slot delay must be a positive finite buffer count, got {0}")]
    InvalidDelay(f64),

    #[error("BPM must be a positive finite number, got {0}")]
    InvalidBpm(f64),

    #[error("Malformed device identifier: {0}")]
    MalformedDeviceId(String),

    #[error("Device identifier {found} does not carry prefix {expected}")]
    WrongDevicePrefix { expected: String, found: String },

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Channel count must not be zero")]
    ZeroChannels,

    #[error("Samplerate must not be zero")]
    ZeroSamplerate,

    #[error("Buffer size must not be zero")]
    ZeroBufferSize,

    #[error("{what} {value} outside supported range [{min}, {max}]")]
    OutOfRange {
        what: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("Malformed segmentation: {0}")]
    InvalidSegmentation(String),

    #[error("Invalid loop region [{left}, {right})")]
    InvalidLoop { left: u32, right: u32 },

    #[error("App buffer count must be 4 or 8, got {0}")]
    InvalidBufferCount(usize),

    #[error("Invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: usize },

    #[error("Backend not supported on this platform: {0}")]
    UnsupportedBackend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type alias
pub type ConfigResult<T> = Result<T, ConfigError>;
