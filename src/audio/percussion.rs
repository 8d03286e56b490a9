//! One-shot percussion voices retriggered by the step clock.

use super::primitives::{BiquadFilter, FilterKind, Gain, NoiseBuffer, NoisePlayer, Oscillator, Waveform};

/// Sine kick: pitch drops 140 Hz -> 45 Hz over 120 ms with a matching fast decay.
pub struct Kick {
    osc: Oscillator,
    amp: Gain,
}

impl Kick {
    pub const START_HZ: f32 = 140.0;
    pub const END_HZ: f32 = 45.0;
    const SWEEP: f64 = 0.12;
    const DECAY: f64 = 0.14;
    const LENGTH: f64 = 0.15;
    const PEAK: f32 = 0.35;

    pub fn new(at: f64, sample_rate: f32) -> Self {
        let mut osc = Oscillator::new(Waveform::Sine, Self::START_HZ, sample_rate);
        osc.frequency.set_value_at_time(Self::START_HZ, at);
        osc.frequency
            .exponential_ramp_to_value_at_time(Self::END_HZ, at + Self::SWEEP);
        osc.start(at);
        osc.stop(at + Self::LENGTH);

        let mut amp = Gain::new(Self::PEAK);
        amp.gain.set_value_at_time(Self::PEAK, at);
        amp.gain.exponential_ramp_to_value_at_time(0.001, at + Self::DECAY);
        Self { osc, amp }
    }

    pub fn is_finished(&self, now: f64) -> bool {
        self.osc.is_finished(now)
    }

    pub fn next_sample(&mut self, now: f64) -> f32 {
        let s = self.osc.next_sample(now);
        self.amp.process(s, now)
    }
}

/// Noise burst through a 6 kHz high-pass with a ~40 ms exponential decay.
pub struct HiHat {
    noise: NoisePlayer,
    filter: BiquadFilter,
    amp: Gain,
}

impl HiHat {
    pub const CUTOFF_HZ: f32 = 6000.0;
    const DECAY: f64 = 0.04;
    const LENGTH: f64 = 0.05;
    const PEAK: f32 = 0.08;

    pub fn new(noise: NoiseBuffer, at: f64, sample_rate: f32) -> Self {
        let mut amp = Gain::new(Self::PEAK);
        amp.gain.set_value_at_time(Self::PEAK, at);
        amp.gain.exponential_ramp_to_value_at_time(0.001, at + Self::DECAY);
        Self {
            noise: NoisePlayer::new(noise, at, at + Self::LENGTH),
            filter: BiquadFilter::new(FilterKind::HighPass, Self::CUTOFF_HZ, sample_rate),
            amp,
        }
    }

    pub fn is_finished(&self, now: f64) -> bool {
        self.noise.is_finished(now)
    }

    pub fn next_sample(&mut self, now: f64) -> f32 {
        let s = self.noise.next_sample(now);
        let s = self.filter.process(s, now);
        self.amp.process(s, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const SR: f32 = 44100.0;

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn kick_decays_and_finishes() {
        let mut kick = Kick::new(0.0, SR);
        let render: Vec<f32> = (0..(SR as usize / 5))
            .map(|n| kick.next_sample(n as f64 / SR as f64))
            .collect();
        let early = peak(&render[..441]);
        let late = peak(&render[5000..6000]);
        assert!(early > 0.1);
        assert!(late < early * 0.1);
        assert!(render[render.len() - 1] == 0.0);
        assert!(kick.is_finished(0.15));
    }

    #[test]
    fn hat_waits_for_its_offset() {
        let noise = NoiseBuffer::with_rng(44100, &mut StdRng::seed_from_u64(3));
        let mut hat = HiHat::new(noise, 0.12, SR);
        assert_eq!(hat.next_sample(0.0), 0.0);
        assert!(!hat.is_finished(0.13));
        assert!(hat.is_finished(0.18));
    }
}
