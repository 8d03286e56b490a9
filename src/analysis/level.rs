//! Smoothed microphone loudness for the text glow.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use atomic_float::AtomicF32;

use super::spectrum::SpectrumAnalyser;
use super::AnalysisConfig;

/// RMS over byte frequency bins, divided by `reference` and clamped to [0, 1].
pub fn normalized_rms(bins: &[u8], reference: f32) -> f32 {
    if bins.is_empty() || reference <= 0.0 {
        return 0.0;
    }
    let sum: f32 = bins.iter().map(|&b| (b as f32) * (b as f32)).sum();
    let rms = (sum / bins.len() as f32).sqrt();
    (rms / reference).clamp(0.0, 1.0)
}

/// Single-pole low-pass over per-frame loudness samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedVolume {
    value: f32,
    retain: f32,
}

impl Default for SmoothedVolume {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl SmoothedVolume {
    pub fn new(retain: f32) -> Self {
        Self {
            value: 0.0,
            retain: retain.clamp(0.0, 1.0),
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// `value = retain * value + (1 - retain) * sample`
    pub fn update(&mut self, sample: f32) -> f32 {
        self.value = self.retain * self.value + (1.0 - self.retain) * sample.clamp(0.0, 1.0);
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

/// The per-frame input loop. Only produces values between `start` and
/// `stop`; stopping zeroes the published level.
pub struct InputLevelMeter {
    analyser: SpectrumAnalyser,
    volume: SmoothedVolume,
    reference: f32,
    level: Arc<AtomicF32>,
    running: bool,
}

impl InputLevelMeter {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            analyser: SpectrumAnalyser::new(config.fft_size, config.smoothing),
            volume: SmoothedVolume::new(config.retain),
            reference: config.reference_level,
            level: Arc::new(AtomicF32::new(0.0)),
            running: false,
        }
    }

    /// Shared read side for renderers on other threads.
    pub fn level_handle(&self) -> Arc<AtomicF32> {
        Arc::clone(&self.level)
    }

    pub fn level(&self) -> f32 {
        self.level.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        log::debug!("[speechoke][analysis] input level loop started");
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.volume.reset();
        self.analyser.reset();
        self.level.store(0.0, Ordering::Relaxed);
        log::debug!("[speechoke][analysis] input level loop stopped");
    }

    /// Queue microphone samples. Ignored while stopped.
    pub fn feed(&mut self, samples: &[f32]) {
        if self.running {
            self.analyser.push_samples(samples);
        }
    }

    /// Run one animation frame. `None` once the loop has been stopped.
    pub fn frame(&mut self) -> Option<f32> {
        if !self.running {
            return None;
        }
        let bins = self.analyser.byte_frequency_data();
        let value = self.volume.update(normalized_rms(&bins, self.reference));
        self.level.store(value, Ordering::Relaxed);
        Some(value)
    }
}
