//! Bar model for the live frequency display.

use super::spectrum::SpectrumAnalyser;

pub const VISUALIZER_FFT_SIZE: usize = 128;
pub const VISUALIZER_SMOOTHING: f32 = 0.6;
pub const BAR_HUE: f32 = 158.0;

/// One bar, ready for any renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    /// Height as a share of the full display, 0..=1.
    pub fraction: f32,
    /// HSL lightness in percent.
    pub lightness: f32,
    pub hue: f32,
}

/// Higher bins get up to 50% boost so the treble end stays visible.
pub fn bars(bins: &[u8]) -> Vec<Bar> {
    let n = bins.len().max(1) as f32;
    bins.iter()
        .enumerate()
        .map(|(i, &bin)| {
            let boost = 1.0 + (i as f32 / n) * 0.5;
            let value = (bin as f32 * boost).min(255.0);
            let fraction = value / 255.0;
            Bar {
                fraction,
                lightness: 50.0 + fraction * 30.0,
                hue: BAR_HUE,
            }
        })
        .collect()
}

/// Its own analyser: coarser and snappier than the loudness one.
pub struct FrequencyVisualizer {
    analyser: SpectrumAnalyser,
}

impl Default for FrequencyVisualizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyVisualizer {
    pub fn new() -> Self {
        Self {
            analyser: SpectrumAnalyser::new(VISUALIZER_FFT_SIZE, VISUALIZER_SMOOTHING),
        }
    }

    pub fn feed(&mut self, samples: &[f32]) {
        self.analyser.push_samples(samples);
    }

    pub fn bars(&mut self) -> Vec<Bar> {
        bars(&self.analyser.byte_frequency_data())
    }

    pub fn reset(&mut self) {
        self.analyser.reset();
    }
}
