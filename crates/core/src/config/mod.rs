use std::{path::Path, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{protocol, PoiError, Result};

/// Top-level configuration structure for the controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub stream: StreamConfig,
    pub audio: AudioConfig,
    pub link: LinkConfig,
}

impl AppConfig {
    /// Parses a configuration document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.device.target_name.is_empty() {
            return Err(PoiError::config("device.target_name must not be empty"));
        }
        if self.device.led_count == 0 || self.device.led_count > 255 {
            return Err(PoiError::config(format!(
                "device.led_count must be within 1..=255, got {}",
                self.device.led_count
            )));
        }
        self.device.characteristic_ids()?;

        if self.stream.period_ms == 0 {
            return Err(PoiError::config("stream.period_ms must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.stream.brightness) {
            return Err(PoiError::config(format!(
                "stream.brightness must be within 0.0..=1.0, got {}",
                self.stream.brightness
            )));
        }

        let n = self.audio.fft_size;
        if n < 4 || !n.is_power_of_two() {
            return Err(PoiError::config(format!(
                "audio.fft_size must be a power of two >= 4, got {n}"
            )));
        }
        if self.audio.channels != 2 {
            return Err(PoiError::config("audio.channels must be 2 (interleaved stereo)"));
        }

        // ATT write payloads lose three bytes to the opcode and handle.
        let packet_len = protocol::data_packet_len(self.device.led_count);
        if packet_len + 3 > usize::from(self.link.preferred_mtu) {
            return Err(PoiError::config(format!(
                "a {packet_len}-byte frame packet does not fit link.preferred_mtu {}",
                self.link.preferred_mtu
            )));
        }
        if self.link.interval_min > self.link.interval_max {
            return Err(PoiError::config("link.interval_min exceeds link.interval_max"));
        }
        Ok(())
    }
}

/// Identity of the peripherals the controller looks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Advertised name, matched byte-for-byte.
    pub target_name: String,
    pub led_count: usize,
    pub rx_uuid: String,
    pub tx_uuid: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            target_name: "Open Pixel Poi".to_string(),
            led_count: 21,
            rx_uuid: "6e400002-b5a3-f393-e0a9-e50e24dcca9e".to_string(),
            tx_uuid: "6e400003-b5a3-f393-e0a9-e50e24dcca9e".to_string(),
        }
    }
}

impl DeviceConfig {
    pub fn characteristic_ids(&self) -> Result<CharacteristicIds> {
        Ok(CharacteristicIds {
            rx: parse_uuid(&self.rx_uuid)?,
            tx: parse_uuid(&self.tx_uuid)?,
        })
    }
}

/// Resolved 128-bit identifiers of the two characteristics a POI exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicIds {
    pub rx: u128,
    pub tx: u128,
}

impl Default for CharacteristicIds {
    fn default() -> Self {
        // The defaults are constant strings, so parsing cannot fail.
        DeviceConfig::default()
            .characteristic_ids()
            .unwrap_or(Self { rx: 0, tx: 0 })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub period_ms: u64,
    /// Global multiplier applied to every pixel byte before transmission.
    pub brightness: f32,
    /// Upper bound on how long an effect waits for the spectrum lock.
    pub spectrum_lock_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            period_ms: 40,
            brightness: 0.27,
            spectrum_lock_timeout_ms: 10,
        }
    }
}

impl StreamConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn spectrum_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.spectrum_lock_timeout_ms)
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Transform length in frames; each read pulls this many stereo frames.
    pub fft_size: usize,
    pub channels: usize,
    pub sensitivity: MicSensitivity,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 2_000,
            fft_size: 16,
            channels: 2,
            sensitivity: MicSensitivity::Medium,
        }
    }
}

/// Fixed microphone gain steps selectable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MicSensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl MicSensitivity {
    pub const ALL: [MicSensitivity; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn gain(self) -> f32 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 3.0,
            Self::High => 5.0,
        }
    }

    pub fn as_index(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    pub fn from_index(index: u8) -> Self {
        match index {
            0 => Self::Low,
            2 => Self::High,
            _ => Self::Medium,
        }
    }
}

impl FromStr for MicSensitivity {
    type Err = PoiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(PoiError::config(format!(
                "unknown sensitivity `{other}` (expected low, medium or high)"
            ))),
        }
    }
}

/// Connection-level hints requested from each peripheral after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub connect_timeout_ms: u64,
    pub preferred_mtu: u16,
    /// Connection interval bounds in 1.25 ms units.
    pub interval_min: u16,
    pub interval_max: u16,
    pub latency: u16,
    /// Supervision timeout in 10 ms units.
    pub supervision_timeout: u16,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            preferred_mtu: 247,
            interval_min: 12,
            interval_max: 24,
            latency: 0,
            supervision_timeout: 400,
        }
    }
}

impl LinkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Parses a dashed or bare 32-digit hexadecimal UUID into its integer form.
pub fn parse_uuid(text: &str) -> Result<u128> {
    let hex: String = text.chars().filter(|c| *c != '-').collect();
    if hex.len() != 32 {
        return Err(PoiError::config(format!("`{text}` is not a 128-bit uuid")));
    }
    u128::from_str_radix(&hex, 16)
        .map_err(|err| PoiError::config(format!("`{text}` is not a 128-bit uuid: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.stream.period(), Duration::from_millis(40));
        assert_eq!((config.audio.fft_size, config.audio.channels), (16, 2));
    }

    #[test]
    fn parses_partial_documents() {
        let config =
            AppConfig::from_json_str(r#"{ "stream": { "brightness": 0.5 }, "audio": { "sensitivity": "high" } }"#)
                .unwrap();
        assert_eq!(config.stream.brightness, 0.5);
        assert_eq!(config.stream.period_ms, 40);
        assert_eq!(config.audio.sensitivity, MicSensitivity::High);
        assert_eq!(config.device.target_name, "Open Pixel Poi");
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = AppConfig::from_json_str(r#"{ "stream": { "brightness": 1.5 } }"#).unwrap_err();
        assert!(format!("{err}").contains("brightness"));

        let err = AppConfig::from_json_str(r#"{ "audio": { "fft_size": 24 } }"#).unwrap_err();
        assert!(format!("{err}").contains("power of two"));

        let err = AppConfig::from_json_str(r#"{ "device": { "led_count": 120 } }"#).unwrap_err();
        assert!(format!("{err}").contains("mtu"));
    }

    #[test]
    fn parses_characteristic_uuids() {
        let ids = DeviceConfig::default().characteristic_ids().unwrap();
        assert_eq!(ids.rx, 0x6e40_0002_b5a3_f393_e0a9_e50e_24dc_ca9e);
        assert_eq!(ids.tx, 0x6e40_0003_b5a3_f393_e0a9_e50e_24dc_ca9e);
        assert_eq!(CharacteristicIds::default(), ids);

        assert!(parse_uuid("6e400002").is_err());
        assert!(parse_uuid("zz400002-b5a3-f393-e0a9-e50e24dcca9e").is_err());
    }

    #[test]
    fn sensitivity_round_trips_through_index_and_text() {
        for level in MicSensitivity::ALL {
            assert_eq!(MicSensitivity::from_index(level.as_index()), level);
        }
        assert_eq!("HIGH".parse::<MicSensitivity>().unwrap(), MicSensitivity::High);
        assert!("loud".parse::<MicSensitivity>().is_err());
        assert_eq!(MicSensitivity::Medium.gain(), 3.0);
    }
}
