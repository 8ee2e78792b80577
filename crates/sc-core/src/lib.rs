//! sc-core: Shared types for the soundcard engine
//!
//! This crate provides the vocabulary used by every soundcard crate:
//! sample formats, presets, default constants, configuration, device
//! identifiers and uptime formatting.

mod config;
mod device_id;
mod error;
mod time;

pub use config::*;
pub use device_id::*;
pub use error::*;
pub use time::*;

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Number of tic slots in one measurement period (16 × 64)
pub const DEFAULT_PERIOD: usize = 1024;

/// Default samplerate in Hz
pub const DEFAULT_SAMPLERATE: u32 = 44100;

/// Default hardware buffer size in frames
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default PCM (hardware) channel count
pub const DEFAULT_PCM_CHANNELS: u32 = 2;

/// Default DSP channel count
pub const DEFAULT_DSP_CHANNELS: u32 = 2;

/// Default tempo
pub const DEFAULT_BPM: f64 = 120.0;

/// Default delay factor (4/4 without segmentation)
pub const DEFAULT_DELAY_FACTOR: f64 = 1.0;

/// Default number of sub-blocks per channel and buffer
pub const DEFAULT_SUB_BLOCK_COUNT: u32 = 8;

/// App buffers of a single-direction engine
pub const DEFAULT_APP_BUFFER_COUNT: usize = 4;

/// App buffers of an engine with a double-buffered app set
pub const DEEP_APP_BUFFER_COUNT: usize = 8;

/// Backend-format ring slots
pub const DEFAULT_RING_BUFFER_SIZE: usize = 8;

pub const DEFAULT_LOOP_LEFT: u32 = 0;
pub const DEFAULT_LOOP_RIGHT: u32 = 64;

// ═══════════════════════════════════════════════════════════════════════════════
// FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Sample format of the app buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SoundcardFormat {
    S8,
    S16,
    /// 24-bit samples stored in 32-bit containers
    S24,
    S32,
    S64,
    Float,
    Double,
    /// Pair of doubles
    Complex,
}

impl SoundcardFormat {
    /// Bytes occupied by one sample in an app buffer
    #[inline]
    pub fn word_size(self) -> usize {
        match self {
            Self::S8 => 1,
            Self::S16 => 2,
            Self::S24 | Self::S32 | Self::Float => 4,
            Self::S64 | Self::Double => 8,
            Self::Complex => 16,
        }
    }

    /// Significant bits of an integer format
    #[inline]
    pub fn bits(self) -> Option<u32> {
        match self {
            Self::S8 => Some(8),
            Self::S16 => Some(16),
            Self::S24 => Some(24),
            Self::S32 => Some(32),
            Self::S64 => Some(64),
            Self::Float | Self::Double | Self::Complex => None,
        }
    }

    pub fn is_integer(self) -> bool {
        self.bits().is_some()
    }
}

impl Default for SoundcardFormat {
    fn default() -> Self {
        Self::S16
    }
}

impl std::fmt::Display for SoundcardFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::S8 => "s8",
            Self::S16 => "s16",
            Self::S24 => "s24",
            Self::S32 => "s32",
            Self::S64 => "s64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Complex => "complex",
        };
        f.write_str(name)
    }
}

/// Direction a soundcard serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Capability {
    Playback,
    Capture,
}

impl Default for Capability {
    fn default() -> Self {
        Self::Playback
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRESETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Channel count, samplerate, buffer size and format of a soundcard
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Presets {
    pub channels: u32,
    pub samplerate: u32,
    pub buffer_size: u32,
    pub format: SoundcardFormat,
}

impl Presets {
    pub fn new(channels: u32, samplerate: u32, buffer_size: u32, format: SoundcardFormat) -> Self {
        Self {
            channels,
            samplerate,
            buffer_size,
            format,
        }
    }

    /// Byte size of one app buffer: channels × buffer_size × word_size
    #[inline]
    pub fn buffer_bytes(&self) -> usize {
        self.channels as usize * self.buffer_size as usize * self.format.word_size()
    }

    /// Duration of one hardware buffer in seconds
    #[inline]
    pub fn buffer_seconds(&self) -> f64 {
        self.buffer_size as f64 / self.samplerate as f64
    }

    /// Reject zero values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.channels == 0 {
            return Err(ConfigError::ZeroChannels);
        }
        if self.samplerate == 0 {
            return Err(ConfigError::ZeroSamplerate);
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        Ok(())
    }
}

impl Default for Presets {
    fn default() -> Self {
        Self {
            channels: DEFAULT_PCM_CHANNELS,
            samplerate: DEFAULT_SAMPLERATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            format: SoundcardFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_sizes() {
        assert_eq!(SoundcardFormat::S8.word_size(), 1);
        assert_eq!(SoundcardFormat::S16.word_size(), 2);
        assert_eq!(SoundcardFormat::S24.word_size(), 4);
        assert_eq!(SoundcardFormat::S32.word_size(), 4);
        assert_eq!(SoundcardFormat::S64.word_size(), 8);
        assert_eq!(SoundcardFormat::Float.word_size(), 4);
        assert_eq!(SoundcardFormat::Double.word_size(), 8);
        assert_eq!(SoundcardFormat::Complex.word_size(), 16);
    }

    #[test]
    fn test_buffer_bytes() {
        let presets = Presets::new(2, 44100, 512, SoundcardFormat::S16);
        assert_eq!(presets.buffer_bytes(), 2048);

        let presets = Presets::new(6, 48000, 256, SoundcardFormat::S24);
        assert_eq!(presets.buffer_bytes(), 6 * 256 * 4);
    }

    #[test]
    fn test_presets_validate() {
        assert!(Presets::default().validate().is_ok());

        let zero_buffer = Presets::new(2, 44100, 0, SoundcardFormat::S16);
        assert!(matches!(zero_buffer.validate(), Err(ConfigError::ZeroBufferSize)));

        let zero_channels = Presets::new(0, 44100, 512, SoundcardFormat::S16);
        assert!(matches!(zero_channels.validate(), Err(ConfigError::ZeroChannels)));
    }
}
