//! Ambient mixer: picks which bed is audible and how loud.
//!
//! The graph behind the mixer is created lazily, on the first user gesture,
//! because audio output stays locked until the user interacts. Mode and
//! volume can be set at any time; before the graph exists they are only
//! remembered and get applied as soon as it is built.

use super::cue::MadnessCue;
use super::graph::{AudioGraphHandle, CreateError, OutputBackend};
use super::{AudioConfig, AudioError};

/// Which bed should be heard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixMode {
    #[default]
    Off,
    Ambient,
    Tension,
}

impl MixMode {
    pub fn name(&self) -> &'static str {
        match self {
            MixMode::Off => "OFF",
            MixMode::Ambient => "AMBIENT",
            MixMode::Tension => "TENSION",
        }
    }
}

/// Absolute bus gains the two beds should approach.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GainTargets {
    pub ambient: f32,
    pub tension: f32,
}

/// Map (mode, volume) to bus gains. At most one target is ever nonzero.
pub fn gain_targets(mode: MixMode, volume: f32, config: &AudioConfig) -> GainTargets {
    let volume = volume.clamp(0.0, 1.0);
    match mode {
        MixMode::Off => GainTargets::default(),
        MixMode::Ambient => GainTargets {
            ambient: config.ambient_base_gain * volume,
            tension: 0.0,
        },
        MixMode::Tension => GainTargets {
            ambient: 0.0,
            tension: config.tension_base_gain * volume,
        },
    }
}

/// Evidence that the user has just interacted (click, key press). Only a
/// gesture may bring the audio graph to life.
#[derive(Debug, Clone, Copy)]
pub struct UserGesture(());

impl UserGesture {
    pub fn observed() -> Self {
        Self(())
    }
}

enum GraphState {
    Uninitialized,
    Ready(AudioGraphHandle),
}

pub struct AmbientMixer {
    config: AudioConfig,
    mode: MixMode,
    volume: f32,
    state: GraphState,
    output: Option<Box<dyn OutputBackend>>,
}

impl AmbientMixer {
    pub fn new(config: AudioConfig, output: Box<dyn OutputBackend>) -> Self {
        Self {
            config,
            mode: MixMode::Off,
            volume: 0.5,
            state: GraphState::Uninitialized,
            output: Some(output),
        }
    }

    pub fn mode(&self) -> MixMode {
        self.mode
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, GraphState::Ready(_))
    }

    /// Graph exists and its output is running.
    pub fn is_audible(&self) -> bool {
        match &self.state {
            GraphState::Ready(handle) => handle.is_audible(),
            GraphState::Uninitialized => false,
        }
    }

    pub fn gain_targets(&self) -> GainTargets {
        gain_targets(self.mode, self.volume, &self.config)
    }

    pub fn graph(&self) -> Option<&AudioGraphHandle> {
        match &self.state {
            GraphState::Ready(handle) => Some(handle),
            GraphState::Uninitialized => None,
        }
    }

    /// Run `f` on the live graph, if there is one.
    pub fn with_graph<R>(&self, f: impl FnOnce(&mut super::graph::SynthGraph) -> R) -> Option<R> {
        self.graph().and_then(|handle| handle.with_graph(f))
    }

    pub fn set_mode(&mut self, mode: MixMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        self.update_mix();
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        if self.volume == volume {
            return;
        }
        self.volume = volume;
        self.update_mix();
    }

    /// Build the graph on the first gesture; on later gestures retry a
    /// suspended output. Resume failures are logged, never returned.
    pub fn on_user_gesture(&mut self, gesture: UserGesture) -> Result<(), AudioError> {
        self.unlock(gesture, AudioGraphHandle::create)
    }

    /// Gesture handling with the graph built by `create`. A failed build
    /// keeps the output so the next gesture can try again.
    fn unlock<F>(&mut self, _gesture: UserGesture, create: F) -> Result<(), AudioError>
    where
        F: FnOnce(&AudioConfig, Box<dyn OutputBackend>) -> Result<AudioGraphHandle, CreateError>,
    {
        if self.is_audible() {
            return Ok(());
        }
        if let GraphState::Uninitialized = self.state {
            let Some(output) = self.output.take() else {
                return Err(AudioError::Closed);
            };
            match create(&self.config, output) {
                Ok(handle) => self.state = GraphState::Ready(handle),
                Err(CreateError { error, output }) => {
                    self.output = Some(output);
                    return Err(error);
                }
            }
        }
        self.update_mix();
        Ok(())
    }

    /// Recompute both targets and ramp towards them.
    fn update_mix(&mut self) {
        let targets = self.gain_targets();
        let GraphState::Ready(handle) = &mut self.state else {
            log::debug!(
                "[speechoke][audio] mix buffered mode={} volume={:.2}",
                self.mode.name(),
                self.volume
            );
            return;
        };
        if let Err(err) = handle.resume() {
            log::warn!("[speechoke][audio] resume failed: {err}");
        }
        handle.apply_mix(targets, self.config.fade_time_constant);
        log::info!(
            "[speechoke][audio] mix-update mode={} volume={:.2} ambient_target={:.3} tension_target={:.3} audible={}",
            self.mode.name(),
            self.volume,
            targets.ambient,
            targets.tension,
            handle.is_audible()
        );
    }

    pub fn play_cue(&mut self) {
        let GraphState::Ready(handle) = &mut self.state else {
            log::warn!("[speechoke][audio] cue requested before audio was unlocked");
            return;
        };
        if let Err(err) = handle.play_cue(MadnessCue::new(self.config.sample_rate)) {
            log::warn!("[speechoke][audio] cue failed: {err}");
        }
    }

    /// Stop the step clock and close the graph.
    pub fn teardown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let GraphState::Ready(mut handle) =
            std::mem::replace(&mut self.state, GraphState::Uninitialized)
        {
            handle.close();
        }
        self.output = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::graph::NullOutput;
    use approx::assert_abs_diff_eq;

    fn mixer(output: NullOutput) -> AmbientMixer {
        let config = AudioConfig {
            sample_rate: 8000,
            step_ms: 5,
            ..AudioConfig::default()
        };
        AmbientMixer::new(config, Box::new(output))
    }

    #[test]
    fn at_most_one_bed_is_targeted() {
        let config = AudioConfig::default();
        for i in 0..=10 {
            let v = i as f32 / 10.0;
            let off = gain_targets(MixMode::Off, v, &config);
            let amb = gain_targets(MixMode::Ambient, v, &config);
            let ten = gain_targets(MixMode::Tension, v, &config);
            assert_eq!(off, GainTargets::default());
            assert_abs_diff_eq!(amb.ambient, 0.1 * v);
            assert_eq!(amb.tension, 0.0);
            assert_eq!(ten.ambient, 0.0);
            assert_abs_diff_eq!(ten.tension, 0.15 * v);
        }
    }

    #[test]
    fn settings_are_buffered_until_a_gesture() {
        let mut mixer = mixer(NullOutput::new());
        mixer.set_mode(MixMode::Ambient);
        mixer.set_volume(0.5);
        assert!(!mixer.is_initialized());
        assert_abs_diff_eq!(mixer.gain_targets().ambient, 0.05);

        mixer.on_user_gesture(UserGesture::observed()).unwrap();
        assert!(mixer.is_initialized());
        assert!(mixer.is_audible());
        let graph = mixer.graph().unwrap();
        assert!(graph.sequencer_running());
        mixer.teardown();
    }

    #[test]
    fn volume_is_clamped() {
        let mut mixer = mixer(NullOutput::new());
        mixer.set_volume(1.7);
        assert_eq!(mixer.volume(), 1.0);
        mixer.set_volume(-0.2);
        assert_eq!(mixer.volume(), 0.0);
    }

    #[test]
    fn refused_resume_is_retried_on_next_gesture() {
        let mut mixer = mixer(NullOutput::refusing(1));
        mixer.on_user_gesture(UserGesture::observed()).unwrap();
        assert!(mixer.is_initialized());
        assert!(!mixer.is_audible());
        mixer.on_user_gesture(UserGesture::observed()).unwrap();
        assert!(mixer.is_audible());
        mixer.teardown();
    }

    #[test]
    fn failed_build_is_retried_on_next_gesture() {
        let mut mixer = mixer(NullOutput::new());
        mixer.set_mode(MixMode::Ambient);
        let result = mixer.unlock(UserGesture::observed(), |config, output| {
            AudioGraphHandle::create_with_clock(config, output, |_, _| {
                Err(AudioError::Thread(std::io::Error::other("no threads left")))
            })
        });
        assert!(matches!(result, Err(AudioError::Thread(_))));
        assert!(!mixer.is_initialized());

        mixer.on_user_gesture(UserGesture::observed()).unwrap();
        assert!(mixer.is_initialized());
        assert!(mixer.is_audible());
        mixer.teardown();
    }

    #[test]
    fn graph_is_built_once() {
        let mut mixer = mixer(NullOutput::new());
        mixer.on_user_gesture(UserGesture::observed()).unwrap();
        mixer.with_graph(|g| g.render(&mut [0.0; 64]));
        mixer.on_user_gesture(UserGesture::observed()).unwrap();
        let time = mixer.with_graph(|g| g.current_time()).unwrap();
        assert!(time > 0.0);
        mixer.teardown();
    }
}
