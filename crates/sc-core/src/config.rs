//! Engine configuration
//!
//! Constructed once at startup (from a YAML/JSON file or in code) and
//! handed to the engine by value. Keys use the kebab-case names of the
//! soundcard configuration section:
//!
//! ```yaml
//! backend: alsa
//! device: cpal-out-0
//! pcm-channels: 2
//! samplerate: 48000
//! buffer-size: 256
//! format: s16
//! segmentation: "4/4"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    ConfigError, ConfigResult, DeviceId, Presets, SoundcardFormat, DEFAULT_APP_BUFFER_COUNT,
    DEFAULT_BPM, DEFAULT_BUFFER_SIZE, DEFAULT_DELAY_FACTOR, DEFAULT_DSP_CHANNELS,
    DEFAULT_PCM_CHANNELS, DEFAULT_RING_BUFFER_SIZE, DEFAULT_SAMPLERATE, DEFAULT_SUB_BLOCK_COUNT,
    DEEP_APP_BUFFER_COUNT,
};

/// Platform audio layer the engine talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Platform default host
    Cpal,
    Alsa,
    Oss,
    CoreAudio,
    Wasapi,
    /// Discards everything (headless runs, tests)
    Null,
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::Cpal
    }
}

/// WASAPI share mode (passed through to the backend)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShareMode {
    Shared,
    Exclusive,
}

impl Default for ShareMode {
    fn default() -> Self {
        Self::Shared
    }
}

/// Soundcard engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    pub backend: BackendKind,
    /// Device identifier, `"<backend-prefix>-<index>"`; backend default when absent
    pub device: Option<String>,
    pub dsp_channels: u32,
    pub pcm_channels: u32,
    pub samplerate: u32,
    pub buffer_size: u32,
    pub format: SoundcardFormat,
    pub bpm: f64,
    /// Time signature as `"numerator/denominator"`
    pub segmentation: Option<String>,
    pub wasapi_buffer_size: u32,
    pub wasapi_share_mode: ShareMode,
    /// 4 for single-direction engines, 8 for a double-buffered app set
    pub app_buffer_count: usize,
    pub ring_buffer_size: usize,
    pub sub_block_count: u32,
    pub nonblocking: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            device: None,
            dsp_channels: DEFAULT_DSP_CHANNELS,
            pcm_channels: DEFAULT_PCM_CHANNELS,
            samplerate: DEFAULT_SAMPLERATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            format: SoundcardFormat::default(),
            bpm: DEFAULT_BPM,
            segmentation: None,
            wasapi_buffer_size: DEFAULT_BUFFER_SIZE,
            wasapi_share_mode: ShareMode::default(),
            app_buffer_count: DEFAULT_APP_BUFFER_COUNT,
            ring_buffer_size: DEFAULT_RING_BUFFER_SIZE,
            sub_block_count: DEFAULT_SUB_BLOCK_COUNT,
            nonblocking: false,
        }
    }
}

impl EngineConfig {
    /// Load from a file; `.json` is parsed as JSON, anything else as YAML
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text)?,
            _ => Self::from_yaml_str(&text)?,
        };

        log::debug!("Loaded soundcard config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> ConfigResult<Self> {
        serde_yml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> ConfigResult<Self> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_yaml_string(&self) -> ConfigResult<String> {
        serde_yml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Presets described by this configuration
    pub fn presets(&self) -> Presets {
        Presets::new(self.pcm_channels, self.samplerate, self.buffer_size, self.format)
    }

    /// Delay factor derived from `segmentation`.
    ///
    /// `"numerator/denominator"` maps to `1/numerator × (numerator/denominator)`;
    /// without segmentation the default factor applies.
    pub fn delay_factor(&self) -> ConfigResult<f64> {
        match self.segmentation.as_deref() {
            Some(segmentation) => parse_segmentation(segmentation),
            None => Ok(DEFAULT_DELAY_FACTOR),
        }
    }

    /// Device identifier, if one is configured
    pub fn device_id(&self) -> ConfigResult<Option<DeviceId>> {
        self.device.as_deref().map(str::parse).transpose()
    }

    /// Check every value without adjusting any of them
    pub fn validate(&self) -> ConfigResult<()> {
        self.presets().validate()?;

        if self.dsp_channels == 0 {
            return Err(ConfigError::ZeroChannels);
        }

        validate_bpm(self.bpm)?;
        validate_delay_factor(self.delay_factor()?)?;
        self.device_id()?;

        if self.app_buffer_count != DEFAULT_APP_BUFFER_COUNT
            && self.app_buffer_count != DEEP_APP_BUFFER_COUNT
        {
            return Err(ConfigError::InvalidBufferCount(self.app_buffer_count));
        }
        if self.ring_buffer_size < 2 {
            return Err(ConfigError::InvalidValue {
                what: "ring-buffer-size",
                value: self.ring_buffer_size,
            });
        }
        if self.sub_block_count == 0 {
            return Err(ConfigError::InvalidValue {
                what: "sub-block-count",
                value: 0,
            });
        }
        if self.wasapi_buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }

        Ok(())
    }
}

/// Parse `"numerator/denominator"` into a delay factor
pub fn parse_segmentation(segmentation: &str) -> ConfigResult<f64> {
    let invalid = || ConfigError::InvalidSegmentation(segmentation.to_string());

    let (numerator, denominator) = segmentation.trim().split_once('/').ok_or_else(invalid)?;
    let numerator: u32 = numerator.trim().parse().map_err(|_| invalid())?;
    let denominator: u32 = denominator.trim().parse().map_err(|_| invalid())?;

    if numerator == 0 || denominator == 0 {
        return Err(invalid());
    }

    let numerator = numerator as f64;
    let denominator = denominator as f64;

    Ok(1.0 / numerator * (numerator / denominator))
}

pub fn validate_delay_factor(delay_factor: f64) -> ConfigResult<()> {
    if delay_factor.is_finite() && delay_factor > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidDelayFactor(delay_factor))
    }
}

pub fn validate_bpm(bpm: f64) -> ConfigResult<()> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidBpm(bpm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.delay_factor().unwrap(), DEFAULT_DELAY_FACTOR);
        assert_eq!(config.presets().buffer_bytes(), 2 * 512 * 2);
    }

    #[test]
    fn test_segmentation() {
        assert_relative_eq!(parse_segmentation("4/4").unwrap(), 1.0 / 4.0 * (4.0 / 4.0));
        assert_relative_eq!(parse_segmentation("3/4").unwrap(), 1.0 / 3.0 * (3.0 / 4.0));
        assert_relative_eq!(parse_segmentation(" 7 / 8 ").unwrap(), 1.0 / 7.0 * (7.0 / 8.0));

        assert!(parse_segmentation("4/0").is_err());
        assert!(parse_segmentation("0/4").is_err());
        assert!(parse_segmentation("x/4").is_err());
        assert!(parse_segmentation("44").is_err());
        assert!(parse_segmentation("-3/4").is_err());
    }

    #[test]
    fn test_yaml_keys() {
        let yaml = r#"
backend: alsa
device: cpal-out-1
dsp-channels: 2
pcm-channels: 6
samplerate: 48000
buffer-size: 256
format: s24
bpm: 96.5
segmentation: "3/4"
wasapi-buffer-size: 1024
wasapi-share-mode: exclusive
app-buffer-count: 8
"#;
        let config = EngineConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.backend, BackendKind::Alsa);
        assert_eq!(config.device.as_deref(), Some("cpal-out-1"));
        assert_eq!(config.pcm_channels, 6);
        assert_eq!(config.samplerate, 48000);
        assert_eq!(config.buffer_size, 256);
        assert_eq!(config.format, SoundcardFormat::S24);
        assert_eq!(config.wasapi_share_mode, ShareMode::Exclusive);
        assert_eq!(config.app_buffer_count, 8);
        // Unspecified keys keep their defaults
        assert_eq!(config.ring_buffer_size, DEFAULT_RING_BUFFER_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_keys() {
        let json = r#"{ "backend": "core-audio", "buffer-size": 940, "format": "float" }"#;
        let config = EngineConfig::from_json_str(json).unwrap();

        assert_eq!(config.backend, BackendKind::CoreAudio);
        assert_eq!(config.buffer_size, 940);
        assert_eq!(config.format, SoundcardFormat::Float);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = EngineConfig {
            backend: BackendKind::Wasapi,
            segmentation: Some("6/8".to_string()),
            ..Default::default()
        };
        let text = config.to_yaml_string().unwrap();
        assert_eq!(EngineConfig::from_yaml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_without_clamping() {
        let config = EngineConfig {
            buffer_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroBufferSize)));

        let config = EngineConfig {
            app_buffer_count: 5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBufferCount(5))));

        let config = EngineConfig {
            bpm: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBpm(_))));

        let config = EngineConfig {
            device: Some("no-index".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MalformedDeviceId(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("soundcard.yml");
        std::fs::write(&yaml_path, "samplerate: 96000\n").unwrap();
        assert_eq!(EngineConfig::load(&yaml_path).unwrap().samplerate, 96000);

        let json_path = dir.path().join("soundcard.json");
        std::fs::write(&json_path, r#"{ "samplerate": 22050 }"#).unwrap();
        assert_eq!(EngineConfig::load(&json_path).unwrap().samplerate, 22050);

        let missing = dir.path().join("missing.yml");
        assert!(matches!(EngineConfig::load(missing), Err(ConfigError::Io(_))));
    }
}
