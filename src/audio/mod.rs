// Synth graph, step sequencer and ambient mixer
pub mod param;
pub mod primitives;
pub mod percussion;
pub mod voices;
pub mod sequencer;
pub mod cue;
pub mod graph;
pub mod mixer;

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use cue::MadnessCue;
pub use graph::{AudioGraphHandle, CreateError, GraphSource, NullOutput, OutputBackend, RodioOutput, SynthGraph};
pub use mixer::{gain_targets, AmbientMixer, GainTargets, MixMode, UserGesture};
pub use param::Param;
pub use sequencer::{step_event, StepEvent, StepTimer};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to spawn audio thread: {0}")]
    Thread(#[source] std::io::Error),
    #[error("audio output is suspended")]
    Suspended,
    #[error("audio graph has been closed")]
    Closed,
    #[error("no output device: {0}")]
    Stream(#[from] rodio::StreamError),
    #[error("output refused playback: {0}")]
    Play(#[from] rodio::PlayError),
}

/// Tunables of the `[audio]` config section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Time constant (s) of the bus gain approach on every mix change.
    pub fade_time_constant: f64,
    pub ambient_base_gain: f32,
    pub tension_base_gain: f32,
    /// Sequencer step length in milliseconds.
    pub step_ms: u64,
}

impl AudioConfig {
    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_ms.max(1))
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            fade_time_constant: 0.5,
            ambient_base_gain: 0.1,
            tension_base_gain: 0.15,
            step_ms: sequencer::STEP_INTERVAL.as_millis() as u64,
        }
    }
}
