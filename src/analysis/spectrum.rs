//! Byte frequency-bin snapshots of a live signal.
//!
//! Mirrors the usual platform analyser: the most recent `fft_size` samples
//! are Blackman-windowed and transformed, magnitudes are smoothed against the
//! previous snapshot, converted to decibels and mapped linearly from the
//! `[min_db, max_db]` window onto `0..=255`.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

pub const DEFAULT_MIN_DB: f32 = -100.0;
pub const DEFAULT_MAX_DB: f32 = -30.0;
pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32_768;

pub struct SpectrumAnalyser {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
    window: Vec<f32>,
    /// Ring of the latest `fft_size` input samples.
    history: Vec<f32>,
    write_pos: usize,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyser {
    /// `fft_size` is clamped to `[MIN_FFT_SIZE, MAX_FFT_SIZE]` and rounded
    /// up to a power of two.
    pub fn new(fft_size: usize, smoothing: f32) -> Self {
        let fft_size = fft_size.clamp(MIN_FFT_SIZE, MAX_FFT_SIZE).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        // Blackman window
        let n = fft_size as f32;
        let window = (0..fft_size)
            .map(|i| {
                let x = 2.0 * std::f32::consts::PI * i as f32 / n;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        Self {
            fft,
            fft_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            min_db: DEFAULT_MIN_DB,
            max_db: DEFAULT_MAX_DB,
            window,
            history: vec![0.0; fft_size],
            write_pos: 0,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn push_samples(&mut self, samples: &[f32]) {
        for &s in samples {
            self.history[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Clear both the sample history and the smoothing state.
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
    }

    /// Take a snapshot of the current spectrum, one byte per bin.
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let n = self.fft_size;
        for i in 0..n {
            // Oldest sample first.
            let sample = self.history[(self.write_pos + i) % n];
            self.buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let range = self.max_db - self.min_db;
        self.smoothed
            .iter_mut()
            .zip(&self.buffer)
            .map(|(smoothed, bin)| {
                let magnitude = bin.norm() / n as f32;
                *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
                let db = 20.0 * smoothed.max(f32::MIN_POSITIVE).log10();
                let scaled = 255.0 * (db - self.min_db) / range;
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sr: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.05 * (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero_bytes() {
        let mut analyser = SpectrumAnalyser::new(256, 0.8);
        analyser.push_samples(&[0.0; 256]);
        let bins = analyser.byte_frequency_data();
        assert_eq!(bins.len(), 128);
        assert!(bins.iter().all(|b| *b == 0));
    }

    #[test]
    fn tone_peaks_in_its_bin() {
        // 500 Hz at 8 kHz with a 256-point FFT lands on bin 16.
        let mut analyser = SpectrumAnalyser::new(256, 0.0);
        analyser.push_samples(&sine(500.0, 8000.0, 256));
        let bins = analyser.byte_frequency_data();
        let peak = bins
            .iter()
            .enumerate()
            .max_by_key(|(_, b)| **b)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 16);
        assert!(bins[16] > 200);
    }

    #[test]
    fn smoothing_slows_the_response() {
        let tone = sine(500.0, 8000.0, 256);
        let mut fast = SpectrumAnalyser::new(256, 0.0);
        let mut slow = SpectrumAnalyser::new(256, 0.8);
        fast.push_samples(&tone);
        slow.push_samples(&tone);
        assert!(slow.byte_frequency_data()[16] < fast.byte_frequency_data()[16]);
    }

    #[test]
    fn fft_size_rounds_to_power_of_two() {
        assert_eq!(SpectrumAnalyser::new(100, 0.5).fft_size(), 128);
        assert_eq!(SpectrumAnalyser::new(128, 0.5).frequency_bin_count(), 64);
    }

    #[test]
    fn oversized_fft_is_capped() {
        let analyser = SpectrumAnalyser::new(usize::MAX, 0.8);
        assert_eq!(analyser.fft_size(), MAX_FFT_SIZE);
        assert_eq!(SpectrumAnalyser::new(3, 0.8).fft_size(), MIN_FFT_SIZE);
    }
}
