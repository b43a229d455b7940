//! Configuration management for engine and metronome tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! so stream and click parameters can be adjusted without recompiling.
//! Missing fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::audio::PanLaw;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub metronome: MetronomeConfig,
}

/// Mixing engine and stream parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stream sample rate in Hz; assets are resampled to this rate on load
    pub sample_rate: u32,
    /// Number of sample slots on the mix bus
    pub max_sources: usize,
    /// Size of the internal mixing accumulator, in frames
    pub frames_per_block: usize,
    /// Capacity of the control -> audio command queue
    pub command_queue_capacity: usize,
    /// Hard-clip the mixed output to [-1, 1] before it reaches the driver
    pub clip_output: bool,
    /// Pan law for sources created by the player
    pub pan_law: PanLaw,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            max_sources: 8,
            frames_per_block: 256,
            command_queue_capacity: 32,
            clip_output: true,
            pan_law: PanLaw::Linear,
        }
    }
}

/// Metronome scheduling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Master gain for the first beat of each group
    pub accent_gain: f32,
    /// Master gain for every other beat
    pub normal_gain: f32,
    /// How often the scheduling thread checks the clock
    pub poll_interval_ms: u64,
    /// Slot index of the click sample
    pub click_slot: usize,
    pub default_bpm: u32,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            accent_gain: 1.8,
            normal_gain: 0.4,
            poll_interval_ms: 30,
            click_slot: 0,
            default_bpm: 120,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or the defaults if the file is missing or
    /// the JSON is invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Configuration on Android
    ///
    /// The APK asset manager is owned by the app, so the native side runs
    /// on defaults.
    #[cfg(target_os = "android")]
    pub fn load_android() -> Self {
        log::info!("[Config] Using default configuration on Android");
        Self::default()
    }

    /// Load configuration for non-Android platforms
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/metronome_config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.engine.sample_rate, 48_000);
        assert_eq!(config.engine.max_sources, 8);
        assert!(config.engine.clip_output);
        assert_eq!(config.metronome.accent_gain, 1.8);
        assert_eq!(config.metronome.normal_gain, 0.4);
        assert_eq!(config.metronome.poll_interval_ms, 30);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.engine.frames_per_block, config.engine.frames_per_block);
        assert_eq!(parsed.metronome.default_bpm, config.metronome.default_bpm);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"engine": {"sample_rate": 44100, "pan_law": "constant_power"}}"#)
                .unwrap();
        assert_eq!(parsed.engine.sample_rate, 44_100);
        assert_eq!(parsed.engine.pan_law, PanLaw::ConstantPower);
        assert_eq!(parsed.engine.max_sources, 8);
        assert_eq!(parsed.metronome.click_slot, 0);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/metronome_config.json");
        assert_eq!(config.engine.sample_rate, 48_000);
    }
}
