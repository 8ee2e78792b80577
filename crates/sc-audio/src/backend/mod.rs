//! Platform backend contract
//!
//! The engine talks to audio hardware only through [`Backend`]. A backend
//! enumerates devices, reports capability ranges, opens a stream with the
//! negotiated format and accepts one ring slot of bytes per play step.

mod null;
#[cfg(feature = "cpal-backend")]
mod cpal_out;

pub use null::{NullBackend, NullStats};
#[cfg(feature = "cpal-backend")]
pub use cpal_out::CpalBackend;

use sc_core::{BackendKind, ConfigError, DeviceId, EngineConfig, SoundcardFormat};

use crate::{EngineResult, NativeLayout, NegotiationError, WriteError};

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Enumerated output device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub is_default: bool,
}

/// Inclusive `[min, max]` range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub min: u32,
    pub max: u32,
}

impl Range {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, value: u32) -> bool {
        self.min <= value && value <= self.max
    }

    /// Smallest range covering both
    pub fn union(self, other: Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }
}

/// What a device accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub channels: Range,
    pub rate: Range,
    pub buffer_size: Range,
    pub formats: Vec<SoundcardFormat>,
}

impl Capabilities {
    /// Check a request against these ranges, first mismatch wins
    pub fn check(&self, request: &OpenRequest) -> Result<(), NegotiationError> {
        if !self.formats.contains(&request.format) {
            return Err(NegotiationError::UnsupportedFormat(request.format));
        }
        if !self.channels.contains(request.channels) {
            return Err(NegotiationError::UnsupportedChannels(request.channels));
        }
        if !self.rate.contains(request.rate) {
            return Err(NegotiationError::UnsupportedRate(request.rate));
        }
        if !self.buffer_size.contains(request.buffer_size) {
            return Err(NegotiationError::UnsupportedBufferSize(request.buffer_size));
        }
        Ok(())
    }
}

/// Stream parameters passed to [`Backend::open`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub device: DeviceId,
    pub channels: u32,
    pub rate: u32,
    pub buffer_size: u32,
    pub format: SoundcardFormat,
    pub exclusive: bool,
    pub nonblocking: bool,
    /// Backend-format slots the engine keeps in flight
    pub ring_slots: usize,
}

impl OpenRequest {
    /// Bytes in one hardware buffer
    pub fn buffer_bytes(&self) -> usize {
        self.channels as usize * self.buffer_size as usize * self.format.word_size()
    }
}

/// Opaque stream handle issued by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendHandle(u64);

impl BackendHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BACKEND TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Platform audio output
pub trait Backend: Send {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Prefix of this backend's device identifiers
    fn device_prefix(&self) -> &str;

    fn list_devices(&mut self) -> EngineResult<Vec<DeviceInfo>>;

    fn query_capabilities(&mut self, device: &DeviceId) -> Result<Capabilities, NegotiationError>;

    /// Byte layout expected by [`write`](Self::write)
    fn native_layout(&self) -> NativeLayout {
        NativeLayout::host()
    }

    fn open(&mut self, request: &OpenRequest) -> Result<BackendHandle, NegotiationError>;

    /// Hand one buffer to the device
    fn write(&mut self, handle: BackendHandle, bytes: &[u8]) -> Result<(), WriteError>;

    /// Recover from an underrun or suspend
    fn prepare(&mut self, _handle: BackendHandle) -> Result<(), WriteError> {
        Ok(())
    }

    /// Non-blocking readiness poll
    fn is_available(&mut self, _handle: BackendHandle) -> bool {
        true
    }

    fn close(&mut self, handle: BackendHandle);
}

/// Backend selected by `config.backend`
pub fn backend_for(config: &EngineConfig) -> EngineResult<Box<dyn Backend>> {
    match config.backend {
        BackendKind::Null => Ok(Box::new(NullBackend::new())),
        #[cfg(feature = "cpal-backend")]
        kind => Ok(Box::new(CpalBackend::new(kind)?)),
        #[cfg(not(feature = "cpal-backend"))]
        kind => Err(ConfigError::UnsupportedBackend(format!("{kind:?}")).into()),
    }
}

/// Capability ranges when a backend reports nothing better
pub(crate) fn fallback_capabilities() -> Capabilities {
    Capabilities {
        channels: Range::new(1, 32),
        rate: Range::new(8000, 384_000),
        buffer_size: Range::new(16, 16384),
        formats: vec![
            SoundcardFormat::S8,
            SoundcardFormat::S16,
            SoundcardFormat::S24,
            SoundcardFormat::S32,
            SoundcardFormat::S64,
            SoundcardFormat::Float,
            SoundcardFormat::Double,
        ],
    }
}

/// Reject ids carrying another backend's prefix
pub(crate) fn check_prefix(backend: &dyn Backend, device: &DeviceId) -> Result<(), ConfigError> {
    if device.prefix() != backend.device_prefix() {
        return Err(ConfigError::WrongDevicePrefix {
            expected: backend.device_prefix().to_string(),
            found: device.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> OpenRequest {
        OpenRequest {
            device: DeviceId::new("null-out", 0),
            channels: 2,
            rate: 44100,
            buffer_size: 512,
            format: SoundcardFormat::S16,
            exclusive: false,
            nonblocking: false,
            ring_slots: 8,
        }
    }

    #[test]
    fn test_capability_check_order() {
        let caps = Capabilities {
            channels: Range::new(1, 2),
            rate: Range::new(44100, 48000),
            buffer_size: Range::new(64, 1024),
            formats: vec![SoundcardFormat::S16],
        };

        assert!(caps.check(&request()).is_ok());
        assert_eq!(request().buffer_bytes(), 2048);

        let mut bad = request();
        bad.format = SoundcardFormat::Float;
        bad.channels = 8;
        assert_eq!(caps.check(&bad), Err(NegotiationError::UnsupportedFormat(SoundcardFormat::Float)));

        let mut bad = request();
        bad.channels = 8;
        assert_eq!(caps.check(&bad), Err(NegotiationError::UnsupportedChannels(8)));

        let mut bad = request();
        bad.rate = 96000;
        assert_eq!(caps.check(&bad), Err(NegotiationError::UnsupportedRate(96000)));

        let mut bad = request();
        bad.buffer_size = 4096;
        assert_eq!(caps.check(&bad), Err(NegotiationError::UnsupportedBufferSize(4096)));
    }

    #[test]
    fn test_range_union() {
        let range = Range::new(2, 4).union(Range::new(1, 3));
        assert_eq!(range, Range::new(1, 4));
        assert!(range.contains(1) && range.contains(4) && !range.contains(5));
    }

    #[test]
    fn test_null_backend_selected() {
        let config = EngineConfig {
            backend: BackendKind::Null,
            ..Default::default()
        };
        let backend = backend_for(&config).unwrap();
        assert_eq!(backend.device_prefix(), "null-out");
    }
}
