// src/config.rs
use std::path::Path;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use crate::drivers::{FilterBands, RythmError};
use crate::types::{ConnectionMode, SessionConfig};

pub const SETTINGS_FILE: &str = "rythm_settings.json";
pub const DURATION_RANGE_MIN: (u32, u32) = (1, 30);
pub const INTERVAL_RANGE_S: (u32, u32) = (10, 300);

/// User settings persisted between runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Recording duration in minutes.
    pub duration_min: u32,
    /// Calculation interval in seconds.
    pub interval_s: u32,
    pub save_on_exit: bool,
    pub port: String,
    pub mode: ConnectionMode,
    pub bands: FilterBands,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            duration_min: 1,
            interval_s: 10,
            save_on_exit: true,
            port: String::new(),
            mode: ConnectionMode::Simulation,
            bands: FilterBands::default(),
        }
    }
}

impl AppConfig {
    /// Reads the settings file. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse settings in {}", path.display()))?;
        Ok(config)
    }

    /// Like [`AppConfig::load`], but falls back to defaults with a warning.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            log::warn!("{e:#}; using default settings");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self).context("failed to encode settings")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write settings to {}", path.display()))?;
        log::info!("settings saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RythmError> {
        let (lo, hi) = DURATION_RANGE_MIN;
        if !(lo..=hi).contains(&self.duration_min) {
            return Err(RythmError::ConfigurationInvalid(format!(
                "recording duration must be {lo}-{hi} min, got {}",
                self.duration_min
            )));
        }
        let (lo, hi) = INTERVAL_RANGE_S;
        if !(lo..=hi).contains(&self.interval_s) {
            return Err(RythmError::ConfigurationInvalid(format!(
                "calculation interval must be {lo}-{hi} s, got {}",
                self.interval_s
            )));
        }
        if u64::from(self.interval_s) > u64::from(self.duration_min) * 60 {
            return Err(RythmError::ConfigurationInvalid(format!(
                "calculation interval ({} s) is longer than the recording ({} min)",
                self.interval_s, self.duration_min
            )));
        }
        if self.mode == ConnectionMode::Hardware && self.port.trim().is_empty() {
            return Err(RythmError::ConfigurationInvalid(
                "no serial port selected".into(),
            ));
        }
        self.bands.validate()
    }

    /// Validated snapshot handed to the engine on start.
    pub fn session(&self) -> Result<SessionConfig, RythmError> {
        self.validate()?;
        Ok(SessionConfig {
            mode: self.mode,
            port: self.port.trim().to_owned(),
            duration_min: self.duration_min,
            interval_s: self.interval_s,
            bands: self.bands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.duration_min, 1);
        assert_eq!(config.interval_s, 10);
        assert!(config.save_on_exit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn interval_longer_than_duration_is_rejected() {
        let config = AppConfig {
            duration_min: 1,
            interval_s: 90,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.session(),
            Err(RythmError::ConfigurationInvalid(_))
        ));
        let ok = AppConfig {
            duration_min: 2,
            interval_s: 90,
            ..AppConfig::default()
        };
        assert_eq!(ok.session().unwrap().interval_s, 90);
    }

    #[test]
    fn out_of_range_values_and_missing_port_are_rejected() {
        let too_long = AppConfig {
            duration_min: 31,
            ..AppConfig::default()
        };
        assert!(too_long.validate().is_err());
        let too_short = AppConfig {
            interval_s: 5,
            ..AppConfig::default()
        };
        assert!(too_short.validate().is_err());
        let hardware = AppConfig {
            mode: ConnectionMode::Hardware,
            port: "  ".into(),
            ..AppConfig::default()
        };
        assert!(hardware.validate().is_err());
    }

    #[test]
    fn settings_survive_a_save_load_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        assert_eq!(AppConfig::load(&path).unwrap(), AppConfig::default());
        let config = AppConfig {
            duration_min: 12,
            interval_s: 30,
            save_on_exit: false,
            port: "/dev/ttyUSB0".into(),
            mode: ConnectionMode::Hardware,
            bands: FilterBands {
                high_heart_hz: 3.0,
                ..FilterBands::default()
            },
        };
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_or_broken_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{ "duration_min": 7 }"#).unwrap();
        let partial = AppConfig::load(&path).unwrap();
        assert_eq!(partial.duration_min, 7);
        assert_eq!(partial.interval_s, 10);
        std::fs::write(&path, "not json").unwrap();
        assert!(AppConfig::load(&path).is_err());
        assert_eq!(AppConfig::load_or_default(&path), AppConfig::default());
    }
}
