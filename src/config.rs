//! Configuration loader for Speechoke.
//!
//! * Looks for `speechoke.toml` in the cwd unless overridden by `--config`.
//! * Provides defaults so the file is optional; every section and key may
//!   be left out.
//!
//! Extend the section structs whenever you add new tunables.

use serde::Deserialize;
use std::fs;
use thiserror::Error;

use crate::analysis::spectrum::{MAX_FFT_SIZE, MIN_FFT_SIZE};
use crate::analysis::AnalysisConfig;
use crate::audio::AudioConfig;
use crate::teleprompter::TeleprompterConfig;

pub const DEFAULT_PATH: &str = "speechoke.toml";

/// Sample rates the synth graph is rendered at.
pub const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8_000..=192_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {field} = {value} ({reason})")]
    OutOfRange {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing track volume (0.0 to 1.0).
    pub volume: f32,
    /// Play the backing beds at all.
    pub ambience: bool,
    pub audio: AudioConfig,
    pub teleprompter: TeleprompterConfig,
    pub analysis: AnalysisConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volume: 0.5,
            ambience: true,
            audio: AudioConfig::default(),
            teleprompter: TeleprompterConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Config {
    /// Load from a TOML file; fall back to defaults on any error.
    pub fn load(path: Option<&str>) -> Self {
        match Self::load_strict(path) {
            Ok(config) => config,
            Err(err) => {
                log::debug!("[speechoke] using default config: {err}");
                Self::default()
            }
        }
    }

    /// Like [`Config::load`] but reports unreadable or invalid files.
    pub fn load_strict(path: Option<&str>) -> Result<Self, ConfigError> {
        let p = path.unwrap_or(DEFAULT_PATH);
        let text = fs::read_to_string(p).map_err(|source| ConfigError::Read {
            path: p.to_owned(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the audio and analysis code cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn out_of_range(field: &'static str, value: impl ToString, reason: &'static str) -> ConfigError {
            ConfigError::OutOfRange {
                field,
                value: value.to_string(),
                reason,
            }
        }

        let audio = &self.audio;
        if !SAMPLE_RATE_RANGE.contains(&audio.sample_rate) {
            return Err(out_of_range("audio.sample_rate", audio.sample_rate, "expected 8000..=192000"));
        }
        if !(audio.fade_time_constant.is_finite() && audio.fade_time_constant >= 0.0) {
            return Err(out_of_range(
                "audio.fade_time_constant",
                audio.fade_time_constant,
                "expected a non-negative number",
            ));
        }
        if audio.step_ms == 0 {
            return Err(out_of_range("audio.step_ms", audio.step_ms, "expected at least 1"));
        }

        let fft = self.analysis.fft_size;
        if !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft) || !fft.is_power_of_two() {
            return Err(out_of_range(
                "analysis.fft_size",
                fft,
                "expected a power of two in 32..=32768",
            ));
        }
        if self.analysis.reference_level.partial_cmp(&0.0) != Some(std::cmp::Ordering::Greater) {
            return Err(out_of_range(
                "analysis.reference_level",
                self.analysis.reference_level,
                "expected a positive number",
            ));
        }

        let tp = &self.teleprompter;
        if !(tp.min_speed > 0.0 && tp.min_speed <= tp.max_speed) {
            return Err(out_of_range(
                "teleprompter.min_speed",
                tp.min_speed,
                "expected 0 < min_speed <= max_speed",
            ));
        }
        Ok(())
    }
}
