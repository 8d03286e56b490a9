//! Composed voice graphs: the ambient drone and the four-layer tension bed.

use super::percussion::{HiHat, Kick};
use super::primitives::{
    BiquadFilter, DelayLine, FilterKind, Gain, NoiseBuffer, Oscillator, Waveform,
};
use super::sequencer::{StepEvent, BASS_GLIDE, LEAD_GLIDE};

/// Two detuned low oscillators through a low-pass whose cutoff breathes
/// with a very slow sine LFO.
pub struct AmbientDrone {
    saw: Oscillator,
    triangle: Oscillator,
    lfo: Oscillator,
    filter: BiquadFilter,
}

impl AmbientDrone {
    pub const ROOT_HZ: f32 = 55.0; // A1
    pub const DETUNED_HZ: f32 = 55.5;
    pub const CUTOFF_HZ: f32 = 120.0;
    pub const LFO_HZ: f32 = 0.05;
    pub const LFO_DEPTH_HZ: f32 = 40.0;

    pub fn new(sample_rate: f32) -> Self {
        Self {
            saw: Oscillator::new(Waveform::Sawtooth, Self::ROOT_HZ, sample_rate),
            triangle: Oscillator::new(Waveform::Triangle, Self::DETUNED_HZ, sample_rate),
            lfo: Oscillator::new(Waveform::Sine, Self::LFO_HZ, sample_rate),
            filter: BiquadFilter::new(FilterKind::LowPass, Self::CUTOFF_HZ, sample_rate),
        }
    }

    pub fn start(&mut self, at: f64) {
        self.saw.start(at);
        self.triangle.start(at);
        self.lfo.start(at);
    }

    pub fn next_sample(&mut self, now: f64) -> f32 {
        let swing = self.lfo.next_sample(now) * Self::LFO_DEPTH_HZ;
        let mix = self.saw.next_sample(now) + self.triangle.next_sample(now);
        self.filter.process_modulated(mix, now, swing)
    }
}

/// Resonant sawtooth bass, retuned on every step.
struct Bass {
    osc: Oscillator,
    filter: BiquadFilter,
}

impl Bass {
    const START_HZ: f32 = 82.41; // E2

    fn new(sample_rate: f32) -> Self {
        Self {
            osc: Oscillator::new(Waveform::Sawtooth, Self::START_HZ, sample_rate),
            filter: BiquadFilter::with_q(FilterKind::LowPass, 160.0, 8.0, sample_rate),
        }
    }

    fn next_sample(&mut self, now: f64) -> f32 {
        let s = self.osc.next_sample(now);
        self.filter.process(s, now)
    }
}

/// Triangle lead with a retriggered envelope and a feedback echo.
struct Lead {
    osc: Oscillator,
    envelope: Gain,
    echo: DelayLine,
}

impl Lead {
    const START_HZ: f32 = 329.63; // E4
    const PEAK: f32 = 0.1;
    const FLOOR: f32 = 0.001;
    const ATTACK: f64 = 0.02;
    const DECAY: f64 = 0.2;
    const ECHO_SECS: f32 = 0.18;
    const ECHO_FEEDBACK: f32 = 0.25;

    fn new(sample_rate: f32) -> Self {
        Self {
            osc: Oscillator::new(Waveform::Triangle, Self::START_HZ, sample_rate),
            envelope: Gain::new(0.0),
            echo: DelayLine::new(Self::ECHO_SECS, Self::ECHO_FEEDBACK, sample_rate),
        }
    }

    fn trigger(&mut self, note_hz: f32, now: f64) {
        self.osc.frequency.set_target_at_time(note_hz, now, LEAD_GLIDE);
        let env = &mut self.envelope.gain;
        env.cancel_scheduled_values(now);
        env.set_value_at_time(Self::FLOOR, now);
        env.linear_ramp_to_value_at_time(Self::PEAK, now + Self::ATTACK);
        env.exponential_ramp_to_value_at_time(Self::FLOOR, now + Self::ATTACK + Self::DECAY);
    }

    fn next_sample(&mut self, now: f64) -> f32 {
        let s = self.osc.next_sample(now);
        let dry = self.envelope.process(s, now);
        dry + self.echo.process(dry)
    }
}

/// Static two-oscillator chord at low constant gain.
struct Pad {
    root: Oscillator,
    third: Oscillator,
    filter: BiquadFilter,
    level: f32,
}

impl Pad {
    fn new(sample_rate: f32) -> Self {
        Self {
            root: Oscillator::new(Waveform::Sawtooth, 164.81, sample_rate), // E3
            third: Oscillator::new(Waveform::Triangle, 207.65, sample_rate), // G#3
            filter: BiquadFilter::new(FilterKind::LowPass, 800.0, sample_rate),
            level: 0.04,
        }
    }

    fn next_sample(&mut self, now: f64) -> f32 {
        let mix = self.root.next_sample(now) + self.third.next_sample(now);
        self.filter.process(mix, now) * self.level
    }
}

/// Bass, lead, pad and percussion layers summed onto one bus.
pub struct TensionBed {
    bass: Bass,
    lead: Lead,
    pad: Pad,
    kicks: Vec<Kick>,
    hats: Vec<HiHat>,
    noise: NoiseBuffer,
    sample_rate: f32,
}

impl TensionBed {
    pub fn new(noise: NoiseBuffer, sample_rate: f32) -> Self {
        Self {
            bass: Bass::new(sample_rate),
            lead: Lead::new(sample_rate),
            pad: Pad::new(sample_rate),
            kicks: Vec::new(),
            hats: Vec::new(),
            noise,
            sample_rate,
        }
    }

    pub fn start(&mut self, at: f64) {
        self.bass.osc.start(at);
        self.lead.osc.start(at);
        self.pad.root.start(at);
        self.pad.third.start(at);
    }

    /// Apply one sequencer step scheduled at `now`.
    pub fn apply_step(&mut self, event: &StepEvent, now: f64) {
        self.lead.trigger(event.note_hz, now);
        self.bass
            .osc
            .frequency
            .set_target_at_time(event.bass_hz, now, BASS_GLIDE);
        if event.kick {
            self.kicks.push(Kick::new(now, self.sample_rate));
        }
        self.hats.push(HiHat::new(
            self.noise.clone(),
            now + event.hat_offset,
            self.sample_rate,
        ));
    }

    /// One-shot voices still scheduled or sounding.
    pub fn active_one_shots(&self) -> usize {
        self.kicks.len() + self.hats.len()
    }

    pub fn next_sample(&mut self, now: f64) -> f32 {
        let mut out = self.bass.next_sample(now) + self.lead.next_sample(now) + self.pad.next_sample(now);
        for kick in &mut self.kicks {
            out += kick.next_sample(now);
        }
        for hat in &mut self.hats {
            out += hat.next_sample(now);
        }
        self.kicks.retain(|k| !k.is_finished(now));
        self.hats.retain(|h| !h.is_finished(now));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sequencer::step_event;
    use rand::{rngs::StdRng, SeedableRng};

    const SR: f32 = 22050.0;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn drone_is_audible_once_started() {
        let mut drone = AmbientDrone::new(SR);
        let silent: Vec<f32> = (0..512).map(|n| drone.next_sample(n as f64 / SR as f64)).collect();
        assert_eq!(rms(&silent), 0.0);
        drone.start(0.0);
        let out: Vec<f32> = (0..SR as usize)
            .map(|n| drone.next_sample(n as f64 / SR as f64))
            .collect();
        assert!(rms(&out) > 0.05);
    }

    #[test]
    fn step_schedules_one_shots_and_they_expire() {
        let noise = NoiseBuffer::with_rng(SR as usize, &mut StdRng::seed_from_u64(11));
        let mut bed = TensionBed::new(noise, SR);
        bed.start(0.0);
        bed.apply_step(&step_event(0), 0.0);
        assert_eq!(bed.active_one_shots(), 2);
        bed.apply_step(&step_event(1), 0.0);
        assert_eq!(bed.active_one_shots(), 3, "odd steps carry no kick");
        for n in 0..(SR as usize / 2) {
            bed.next_sample(n as f64 / SR as f64);
        }
        assert_eq!(bed.active_one_shots(), 0);
    }

    #[test]
    fn lead_glides_to_step_note() {
        let mut lead = Lead::new(SR);
        lead.osc.start(0.0);
        lead.trigger(440.0, 0.0);
        for n in 0..(SR as usize / 5) {
            lead.next_sample(n as f64 / SR as f64);
        }
        assert!((lead.osc.frequency.value() - 440.0).abs() < 0.01);
    }
}
