// Live microphone analysis: byte spectrum, smoothed loudness, bar model
pub mod spectrum;
pub mod level;
pub mod visualizer;

use serde::Deserialize;

pub use level::{normalized_rms, InputLevelMeter, SmoothedVolume};
pub use spectrum::SpectrumAnalyser;
pub use visualizer::{bars, Bar, FrequencyVisualizer};

/// Tunables of the `[analysis]` config section (loudness analyser).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Power of two; yields `fft_size / 2` frequency bins.
    pub fft_size: usize,
    /// Per-bin smoothing between consecutive snapshots.
    pub smoothing: f32,
    /// RMS of byte bins that maps to full loudness.
    pub reference_level: f32,
    /// Share of the previous smoothed volume kept on each frame.
    pub retain: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.8,
            reference_level: 128.0,
            retain: 0.8,
        }
    }
}
