//! Backend device identifiers
//!
//! Devices are addressed as `"<backend-prefix>-<index>"`, e.g.
//! `ags-core-audio-devin-3` or `cpal-out-0`.

use std::fmt;
use std::str::FromStr;

use crate::{ConfigError, ConfigResult};

/// Parsed device identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId {
    prefix: String,
    index: u32,
}

impl DeviceId {
    pub fn new(prefix: impl Into<String>, index: u32) -> Self {
        Self {
            prefix: prefix.into(),
            index,
        }
    }

    /// Parse and require a specific backend prefix
    pub fn parse_with_prefix(text: &str, prefix: &str) -> ConfigResult<Self> {
        let id: Self = text.parse()?;

        if id.prefix != prefix {
            return Err(ConfigError::WrongDevicePrefix {
                expected: prefix.to_string(),
                found: text.to_string(),
            });
        }

        Ok(id)
    }

    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl FromStr for DeviceId {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let malformed = || ConfigError::MalformedDeviceId(text.to_string());

        let (prefix, index) = text.rsplit_once('-').ok_or_else(malformed)?;

        if prefix.is_empty() || prefix.ends_with('-') {
            return Err(malformed());
        }
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let index = index.parse().map_err(|_| malformed())?;

        Ok(Self::new(prefix, index))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_core_audio_id() {
        let id = DeviceId::parse_with_prefix("ags-core-audio-devin-3", "ags-core-audio-devin").unwrap();
        assert_eq!(id.prefix(), "ags-core-audio-devin");
        assert_eq!(id.index(), 3);
        assert_eq!(id.to_string(), "ags-core-audio-devin-3");
    }

    #[test]
    fn test_wrong_prefix() {
        let err = DeviceId::parse_with_prefix("cpal-out-0", "null-out").unwrap_err();
        assert!(matches!(err, ConfigError::WrongDevicePrefix { .. }));
    }

    #[test]
    fn test_malformed_ids() {
        for text in ["", "cpal", "cpal-out-", "-3", "cpal-out--3", "cpal-out-+3", "cpal-out-x", "cpal-out-99999999999"] {
            assert!(
                matches!(text.parse::<DeviceId>(), Err(ConfigError::MalformedDeviceId(_))),
                "{text:?} should be rejected"
            );
        }
    }
}
