//! Driver configuration
//!
//! Pin assignment, signal polarity and waveform timing. A [`DriverConfig`]
//! can be loaded from TOML:
//!
//! ```toml
//! [pins]
//! tx = 22
//! en = 27
//! invert_tx = true
//! invert_en = true
//!
//! [timing]
//! bit_unit_us = 4
//! poll_interval_units = 10
//! completion_timeout_ms = 100
//!
//! [log]
//! level = "debug"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{DmxError, PinRole, Result};

/// Highest Broadcom GPIO number the waveform engine can drive
pub const MAX_GPIO: u8 = 53;

/// Highest GPIO a waveform pulse mask can address
pub const MAX_WAVE_GPIO: u8 = 31;

/// Longest accepted bit unit in microseconds, keeps every pulse within `u32`
pub const MAX_BIT_UNIT_US: u32 = 1000;

/// Maximum number of channel bytes in one DMX512 frame
pub const MAX_CHANNELS: usize = 512;

/// TX/EN pin identities and signal polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinConfiguration {
    /// Data output GPIO
    pub tx: u8,
    /// Line driver enable GPIO
    pub en: u8,
    /// Drive mark as low and space as high on the TX pin
    #[serde(default)]
    pub invert_tx: bool,
    /// Enable pin is active-low
    #[serde(default)]
    pub invert_en: bool,
}

impl PinConfiguration {
    pub fn new(tx: u8, en: u8) -> Self {
        Self {
            tx,
            en,
            invert_tx: false,
            invert_en: false,
        }
    }

    /// Set both polarity flags
    pub fn with_inversion(mut self, invert_tx: bool, invert_en: bool) -> Self {
        self.invert_tx = invert_tx;
        self.invert_en = invert_en;
        self
    }

    /// Check the pin numbers without touching hardware
    pub fn validate(&self) -> Result<()> {
        if self.tx == self.en {
            return Err(DmxError::SamePin(self.tx));
        }
        check_gpio(PinRole::Tx, self.tx)?;
        check_gpio(PinRole::En, self.en)
    }
}

/// TX must fit in a 32-bit pulse mask, EN only needs to be a GPIO
pub(crate) fn check_gpio(role: PinRole, pin: u8) -> Result<()> {
    let max = match role {
        PinRole::Tx => MAX_WAVE_GPIO,
        PinRole::En => MAX_GPIO,
    };
    if pin > max {
        return Err(DmxError::InvalidPin { role, pin });
    }
    Ok(())
}

pub(crate) fn check_bit_unit(bit_unit_us: u32) -> Result<()> {
    if bit_unit_us == 0 || bit_unit_us > MAX_BIT_UNIT_US {
        return Err(DmxError::Config(format!(
            "bit_unit_us must be between 1 and {}, got {}",
            MAX_BIT_UNIT_US, bit_unit_us
        )));
    }
    Ok(())
}

/// Waveform and completion timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Duration of one bit unit in microseconds
    #[serde(default = "default_bit_unit_us")]
    pub bit_unit_us: u32,
    /// Busy-poll interval, in bit units
    #[serde(default = "default_poll_interval_units")]
    pub poll_interval_units: u32,
    /// Give up and stop playback after this long
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_timeout_ms: Option<u64>,
}

fn default_bit_unit_us() -> u32 {
    4
}

fn default_poll_interval_units() -> u32 {
    10
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            bit_unit_us: default_bit_unit_us(),
            poll_interval_units: default_poll_interval_units(),
            completion_timeout_ms: None,
        }
    }
}

impl TimingConfig {
    pub fn bit_unit(&self) -> Duration {
        Duration::from_micros(self.bit_unit_us as u64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_units as u64 * self.bit_unit_us as u64)
    }

    /// Initial sleep before polling starts for a waveform of `pulse_count` pulses.
    ///
    /// Covers break, mark-after-break and start code plus one unit per pulse,
    /// which is always shorter than the real waveform.
    pub fn settle_time(&self, pulse_count: usize) -> Duration {
        let units = 22 + 2 + 10 + pulse_count as u64;
        Duration::from_micros(units * self.bit_unit_us as u64)
    }

    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        check_bit_unit(self.bit_unit_us)?;
        if self.poll_interval_units == 0 {
            return Err(DmxError::Config(
                "poll_interval_units must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging settings for binaries embedding the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default `tracing` level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub pins: PinConfiguration,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl DriverConfig {
    pub fn new(pins: PinConfiguration) -> Self {
        Self {
            pins,
            timing: TimingConfig::default(),
            log: LogConfig::default(),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: DriverConfig =
            toml::from_str(s).map_err(|e| DmxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.pins.validate()?;
        self.timing.validate()
    }
}

/// Check that a channel buffer fits in one DMX512 frame
pub fn validate_payload(data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Err(DmxError::InvalidPayload(
            "data must have at least one element".to_string(),
        ));
    }
    if data.len() > MAX_CHANNELS {
        return Err(DmxError::InvalidPayload(format!(
            "maximum size of data is {}, got {}",
            MAX_CHANNELS,
            data.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_defaults() {
        let timing = TimingConfig::default();
        assert_eq!(timing.bit_unit(), Duration::from_micros(4));
        assert_eq!(timing.poll_interval(), Duration::from_micros(40));
        assert_eq!(timing.completion_timeout(), None);
    }

    #[test]
    fn test_settle_time() {
        let timing = TimingConfig::default();
        // 14 pulses for a single channel
        assert_eq!(timing.settle_time(14), Duration::from_micros((34 + 14) * 4));
    }

    #[test]
    fn test_parse_full_config() {
        let config = DriverConfig::from_toml_str(
            r#"
            [pins]
            tx = 22
            en = 27
            invert_tx = true
            invert_en = true

            [timing]
            bit_unit_us = 4
            poll_interval_units = 5
            completion_timeout_ms = 100

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.pins,
            PinConfiguration::new(22, 27).with_inversion(true, true)
        );
        assert_eq!(config.timing.poll_interval(), Duration::from_micros(20));
        assert_eq!(
            config.timing.completion_timeout(),
            Some(Duration::from_millis(100))
        );
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = DriverConfig::from_toml_str("[pins]\ntx = 22\nen = 27\n").unwrap();
        assert!(!config.pins.invert_tx);
        assert!(!config.pins.invert_en);
        assert_eq!(config.timing, TimingConfig::default());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_reject_same_pins() {
        let result = DriverConfig::from_toml_str("[pins]\ntx = 5\nen = 5\n");
        assert!(matches!(result, Err(DmxError::SamePin(5))));
    }

    #[test]
    fn test_reject_out_of_range_pin() {
        let result = DriverConfig::from_toml_str("[pins]\ntx = 32\nen = 5\n");
        assert!(matches!(
            result,
            Err(DmxError::InvalidPin {
                role: PinRole::Tx,
                pin: 32
            })
        ));

        let result = DriverConfig::from_toml_str("[pins]\ntx = 5\nen = 54\n");
        assert!(matches!(
            result,
            Err(DmxError::InvalidPin {
                role: PinRole::En,
                pin: 54
            })
        ));
        assert!(DriverConfig::from_toml_str("[pins]\ntx = 5\nen = 53\n").is_ok());
    }

    #[test]
    fn test_reject_zero_bit_unit() {
        let result =
            DriverConfig::from_toml_str("[pins]\ntx = 1\nen = 2\n[timing]\nbit_unit_us = 0\n");
        assert!(matches!(result, Err(DmxError::Config(_))));
    }

    #[test]
    fn test_reject_oversized_bit_unit() {
        let result = DriverConfig::from_toml_str(
            "[pins]\ntx = 1\nen = 2\n[timing]\nbit_unit_us = 200000000\n",
        );
        assert!(matches!(result, Err(DmxError::Config(_))));

        let timing = TimingConfig {
            bit_unit_us: MAX_BIT_UNIT_US,
            ..TimingConfig::default()
        };
        assert!(timing.validate().is_ok());
    }

    #[test]
    fn test_reject_zero_poll_interval() {
        let timing = TimingConfig {
            poll_interval_units: 0,
            ..TimingConfig::default()
        };
        assert!(matches!(timing.validate(), Err(DmxError::Config(_))));
    }

    #[test]
    fn test_reject_malformed_toml() {
        assert!(matches!(
            DriverConfig::from_toml_str("[pins\ntx = 1"),
            Err(DmxError::Config(_))
        ));
    }

    #[test]
    fn test_payload_limits() {
        assert!(validate_payload(&[0]).is_ok());
        assert!(validate_payload(&[0; MAX_CHANNELS]).is_ok());
        assert!(validate_payload(&[]).is_err());
        assert!(validate_payload(&[0; MAX_CHANNELS + 1]).is_err());
    }
}
