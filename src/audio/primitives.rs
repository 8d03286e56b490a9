//! Signal building blocks: oscillators, gain stages, biquad filters, a
//! feedback delay line and a pre-generated white-noise buffer.
//!
//! Every node is pulled one sample at a time with the current graph time in
//! seconds, so parameter automation stays sample-accurate.

use std::f32::consts::PI;
use std::sync::Arc;

use dasp_ring_buffer::Fixed;
use rand::Rng;

use super::param::Param;

/// Oscillator waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Evaluate one cycle at `phase` in `[0, 1)`.
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * 2.0 * PI).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => {
                if phase < 0.25 {
                    4.0 * phase
                } else if phase < 0.75 {
                    2.0 - 4.0 * phase
                } else {
                    4.0 * phase - 4.0
                }
            }
        }
    }
}

/// Phase-accumulating oscillator with an automatable frequency.
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    pub frequency: Param,
    phase: f32,
    sample_rate: f32,
    start_at: Option<f64>,
    stop_at: Option<f64>,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f32, sample_rate: f32) -> Self {
        Self {
            waveform,
            frequency: Param::new(frequency),
            phase: 0.0,
            sample_rate,
            start_at: None,
            stop_at: None,
        }
    }

    pub fn start(&mut self, at: f64) {
        self.start_at = Some(at);
    }

    pub fn stop(&mut self, at: f64) {
        self.stop_at = Some(at);
    }

    /// True once a scheduled stop time has passed.
    pub fn is_finished(&self, now: f64) -> bool {
        self.stop_at.is_some_and(|stop| now >= stop)
    }

    fn is_sounding(&self, now: f64) -> bool {
        self.start_at.is_some_and(|start| now >= start) && !self.is_finished(now)
    }

    pub fn next_sample(&mut self, now: f64) -> f32 {
        let freq = self.frequency.value_at(now);
        if !self.is_sounding(now) {
            return 0.0;
        }
        let out = self.waveform.sample(self.phase);
        self.phase += freq / self.sample_rate;
        self.phase -= self.phase.floor();
        out
    }
}

/// Scalar multiplier stage.
#[derive(Debug, Clone, Default)]
pub struct Gain {
    pub gain: Param,
}

impl Gain {
    pub fn new(gain: f32) -> Self {
        Self {
            gain: Param::new(gain),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32, now: f64) -> f32 {
        input * self.gain.value_at(now)
    }
}

/// Filter response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    LowPass,
    HighPass,
}

/// Second-order IIR filter (RBJ cookbook).
///
/// Resonance is given in decibels the way platform biquads take it for
/// low/high-pass responses; the default of 1 dB is a gentle corner.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    kind: FilterKind,
    pub frequency: Param,
    q_db: f32,
    sample_rate: f32,
    coeffs: [f32; 5],
    designed_for: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadFilter {
    pub const DEFAULT_Q_DB: f32 = 1.0;

    pub fn new(kind: FilterKind, cutoff: f32, sample_rate: f32) -> Self {
        Self::with_q(kind, cutoff, Self::DEFAULT_Q_DB, sample_rate)
    }

    pub fn with_q(kind: FilterKind, cutoff: f32, q_db: f32, sample_rate: f32) -> Self {
        let mut filter = Self {
            kind,
            frequency: Param::new(cutoff),
            q_db,
            sample_rate,
            coeffs: [0.0; 5],
            designed_for: f32::NAN,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        };
        filter.design(cutoff);
        filter
    }

    fn design(&mut self, cutoff: f32) {
        let nyquist = self.sample_rate * 0.5;
        let f = cutoff.clamp(10.0, nyquist * 0.99);
        let w0 = 2.0 * PI * f / self.sample_rate;
        let (sin, cos) = w0.sin_cos();
        let q = 10f32.powf(self.q_db / 20.0);
        let alpha = sin / (2.0 * q);
        let (b0, b1, b2) = match self.kind {
            FilterKind::LowPass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
            FilterKind::HighPass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
        };
        let a0 = 1.0 + alpha;
        self.coeffs = [b0 / a0, b1 / a0, b2 / a0, (-2.0 * cos) / a0, (1.0 - alpha) / a0];
        self.designed_for = cutoff;
    }

    #[inline]
    pub fn process(&mut self, input: f32, now: f64) -> f32 {
        self.process_modulated(input, now, 0.0)
    }

    /// Filter `input` with an audio-rate offset added to the cutoff.
    pub fn process_modulated(&mut self, input: f32, now: f64, cutoff_offset: f32) -> f32 {
        let cutoff = self.frequency.value_at(now) + cutoff_offset;
        if cutoff != self.designed_for {
            self.design(cutoff);
        }
        let [b0, b1, b2, a1, a2] = self.coeffs;
        let y = b0 * input + b1 * self.x1 + b2 * self.x2 - a1 * self.y1 - a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// Fixed-length delay with a feedback path around it.
pub struct DelayLine {
    buffer: Fixed<Vec<f32>>,
    feedback: f32,
}

impl DelayLine {
    pub fn new(delay_secs: f32, feedback: f32, sample_rate: f32) -> Self {
        let len = ((delay_secs * sample_rate).round() as usize).max(1);
        Self {
            buffer: Fixed::from(vec![0.0; len]),
            feedback,
        }
    }

    pub fn delay_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Push `input` and return the signal delayed by the line length.
    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = *self.buffer.get(0);
        self.buffer.push(input + delayed * self.feedback);
        delayed
    }
}

/// One second of uniform white noise in `[-1, 1]`, shared between players.
#[derive(Debug, Clone)]
pub struct NoiseBuffer {
    samples: Arc<[f32]>,
}

impl NoiseBuffer {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_rng(sample_rate as usize, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        let samples: Vec<f32> = (0..len).map(|_| rng.gen_range(-1.0..=1.0)).collect();
        Self {
            samples: samples.into(),
        }
    }

    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Plays a [`NoiseBuffer`] once from the start between its start and stop times.
#[derive(Debug, Clone)]
pub struct NoisePlayer {
    buffer: NoiseBuffer,
    position: usize,
    start_at: f64,
    stop_at: f64,
}

impl NoisePlayer {
    pub fn new(buffer: NoiseBuffer, start_at: f64, stop_at: f64) -> Self {
        Self {
            buffer,
            position: 0,
            start_at,
            stop_at,
        }
    }

    pub fn is_finished(&self, now: f64) -> bool {
        now >= self.stop_at || self.position >= self.buffer.len()
    }

    pub fn next_sample(&mut self, now: f64) -> f32 {
        if now < self.start_at || self.is_finished(now) {
            return 0.0;
        }
        let out = self.buffer.samples()[self.position];
        self.position += 1;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};

    const SR: f32 = 8000.0;

    #[test]
    fn waveforms_stay_in_range() {
        for wave in [Waveform::Sine, Waveform::Square, Waveform::Sawtooth, Waveform::Triangle] {
            for i in 0..100 {
                let v = wave.sample(i as f32 / 100.0);
                assert!((-1.0..=1.0).contains(&v), "{wave:?} produced {v}");
            }
        }
        assert_abs_diff_eq!(Waveform::Triangle.sample(0.25), 1.0);
        assert_abs_diff_eq!(Waveform::Triangle.sample(0.75), -1.0);
    }

    #[test]
    fn oscillator_silent_until_started_and_after_stop() {
        let mut osc = Oscillator::new(Waveform::Square, 100.0, SR);
        assert_eq!(osc.next_sample(0.0), 0.0);
        osc.start(0.0);
        osc.stop(0.5);
        assert_eq!(osc.next_sample(0.1), 1.0);
        assert_eq!(osc.next_sample(0.5), 0.0);
        assert!(osc.is_finished(0.5));
    }

    #[test]
    fn lowpass_passes_dc_and_highpass_blocks_it() {
        let mut lp = BiquadFilter::new(FilterKind::LowPass, 200.0, SR);
        let mut hp = BiquadFilter::new(FilterKind::HighPass, 200.0, SR);
        let (mut l, mut h) = (0.0, 0.0);
        for n in 0..4000 {
            let t = n as f64 / SR as f64;
            l = lp.process(1.0, t);
            h = hp.process(1.0, t);
        }
        assert_abs_diff_eq!(l, 1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(h, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn delay_line_echoes_with_feedback() {
        let mut delay = DelayLine::new(0.001, 0.25, SR); // 8 samples
        assert_eq!(delay.delay_samples(), 8);
        let mut out = Vec::new();
        for n in 0..24 {
            out.push(delay.process(if n == 0 { 1.0 } else { 0.0 }));
        }
        assert_eq!(out[8], 1.0);
        assert_abs_diff_eq!(out[16], 0.25);
        assert_eq!(out[7], 0.0);
    }

    #[test]
    fn noise_buffer_is_one_second_in_unit_range() {
        let noise = NoiseBuffer::with_rng(44100, &mut StdRng::seed_from_u64(7));
        assert_eq!(noise.len(), 44100);
        assert!(noise.samples().iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(noise.samples().iter().any(|s| *s != 0.0));
    }

    #[test]
    fn noise_player_respects_window() {
        let noise = NoiseBuffer::with_rng(16, &mut StdRng::seed_from_u64(1));
        let first = noise.samples()[0];
        let mut player = NoisePlayer::new(noise, 1.0, 2.0);
        assert_eq!(player.next_sample(0.5), 0.0);
        assert_eq!(player.next_sample(1.0), first);
        assert!(player.is_finished(2.0));
    }
}
