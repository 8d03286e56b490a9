//! The "madness" stinger: a rising dissonant cluster over a static burst.
//!
//! Played on demand through its own sink, independent of the ambient mixer.

use std::time::Duration;

use rodio::Source;

use super::primitives::{BiquadFilter, FilterKind, Gain, NoiseBuffer, NoisePlayer, Oscillator, Waveform};

const CLUSTER_HZ: [f32; 5] = [100.0, 154.0, 168.0, 220.0, 310.0];
const LENGTH_SECS: f64 = 2.5;
const BEND_SECS: f64 = 2.0;
const BEND_RATIO: f32 = 4.0;
const VOICE_GAIN: f32 = 0.2;

pub struct MadnessCue {
    voices: Vec<Oscillator>,
    master: Gain,
    noise: NoisePlayer,
    noise_filter: BiquadFilter,
    noise_gain: Gain,
    sample_rate: u32,
    frame: u64,
    total_frames: u64,
}

impl MadnessCue {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let voices = CLUSTER_HZ
            .iter()
            .enumerate()
            .map(|(i, &hz)| {
                let wave = if i % 2 == 0 { Waveform::Sawtooth } else { Waveform::Square };
                let mut osc = Oscillator::new(wave, hz, sr);
                osc.frequency.set_value_at_time(hz, 0.0);
                osc.frequency
                    .exponential_ramp_to_value_at_time(hz * BEND_RATIO, BEND_SECS);
                osc.start(0.0);
                osc.stop(LENGTH_SECS);
                osc
            })
            .collect();

        let mut master = Gain::new(0.5);
        master.gain.set_value_at_time(0.5, 0.0);
        master.gain.exponential_ramp_to_value_at_time(0.01, LENGTH_SECS);

        // Two seconds of static at half scale.
        let mut rng = rand::thread_rng();
        let raw = NoiseBuffer::with_rng(sample_rate as usize * 2, &mut rng);
        let scaled: Vec<f32> = raw.samples().iter().map(|s| s * 0.5).collect();
        let burst = NoiseBuffer::from_samples(scaled);

        let mut noise_gain = Gain::new(0.8);
        noise_gain.gain.set_value_at_time(0.8, 0.0);
        noise_gain.gain.exponential_ramp_to_value_at_time(0.01, 1.0);

        Self {
            voices,
            master,
            noise: NoisePlayer::new(burst, 0.0, LENGTH_SECS),
            noise_filter: BiquadFilter::new(FilterKind::HighPass, 500.0, sr),
            noise_gain,
            sample_rate,
            frame: 0,
            total_frames: (LENGTH_SECS * sample_rate as f64) as u64,
        }
    }

    fn render_sample(&mut self, now: f64) -> f32 {
        let cluster: f32 = self
            .voices
            .iter_mut()
            .map(|v| v.next_sample(now) * VOICE_GAIN)
            .sum();
        let burst = self.noise.next_sample(now);
        let burst = self.noise_filter.process(burst, now);
        // The burst bypasses the master fade.
        self.master.process(cluster, now) + self.noise_gain.process(burst, now)
    }
}

impl Iterator for MadnessCue {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.frame >= self.total_frames {
            return None;
        }
        let now = self.frame as f64 / self.sample_rate as f64;
        self.frame += 1;
        Some(self.render_sample(now).clamp(-1.0, 1.0))
    }
}

impl Source for MadnessCue {
    fn current_frame_len(&self) -> Option<usize> {
        Some((self.total_frames - self.frame) as usize)
    }
    fn channels(&self) -> u16 {
        1
    }
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(LENGTH_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cue_lasts_two_and_a_half_seconds() {
        let cue = MadnessCue::new(8000);
        assert_eq!(cue.total_duration(), Some(Duration::from_millis(2500)));
        assert_eq!(cue.count(), 20_000);
    }

    #[test]
    fn cue_fades_out() {
        let samples: Vec<f32> = MadnessCue::new(8000).collect();
        let loud = samples[..800].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let tail = samples[19_000..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(loud > 0.2);
        assert!(tail < 0.05);
    }
}
