//! The synth graph, its render source and the handle that owns its lifetime.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use thiserror::Error;

use super::cue::MadnessCue;
use super::mixer::GainTargets;
use super::primitives::{Gain, NoiseBuffer};
use super::sequencer::{SequencerState, StepEvent, StepTimer};
use super::voices::{AmbientDrone, TensionBed};
use super::{AudioConfig, AudioError};

/// Every node of the session: both beds behind their mix-bus gains.
///
/// All oscillators start at construction and run for the lifetime of the
/// graph; audibility is controlled only through the two bus gains.
pub struct SynthGraph {
    sample_rate: u32,
    frames: u64,
    drone: AmbientDrone,
    tension: TensionBed,
    ambient_bus: Gain,
    tension_bus: Gain,
    sequencer: SequencerState,
    last_step_at: Option<f64>,
}

impl SynthGraph {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let mut drone = AmbientDrone::new(sr);
        let mut tension = TensionBed::new(NoiseBuffer::new(sample_rate), sr);
        drone.start(0.0);
        tension.start(0.0);
        Self {
            sample_rate,
            frames: 0,
            drone,
            tension,
            ambient_bus: Gain::new(0.0),
            tension_bus: Gain::new(0.0),
            sequencer: SequencerState::default(),
            last_step_at: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Graph clock in seconds, advanced only by rendering.
    pub fn current_time(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// Current (ambient, tension) bus gains.
    pub fn bus_gains(&self) -> (f32, f32) {
        (self.ambient_bus.gain.value(), self.tension_bus.gain.value())
    }

    pub fn sequencer_step(&self) -> usize {
        self.sequencer.step()
    }

    pub fn active_one_shots(&self) -> usize {
        self.tension.active_one_shots()
    }

    /// Ramp both buses towards `targets` from the current clock time.
    pub fn retarget(&mut self, targets: GainTargets, time_constant: f64) {
        let now = self.current_time();
        for (bus, target) in [
            (&mut self.ambient_bus, targets.ambient),
            (&mut self.tension_bus, targets.tension),
        ] {
            bus.gain.cancel_scheduled_values(now);
            bus.gain.set_target_at_time(target, now, time_constant);
        }
    }

    /// Play the next sequencer step at the current clock time. Returns `None`
    /// while the clock is frozen (output suspended) so one-shots never pile up.
    pub fn advance_step(&mut self) -> Option<StepEvent> {
        let now = self.current_time();
        if self.last_step_at == Some(now) {
            return None;
        }
        self.last_step_at = Some(now);
        let event = self.sequencer.tick();
        self.tension.apply_step(&event, now);
        Some(event)
    }

    pub fn next_sample(&mut self) -> f32 {
        let now = self.current_time();
        let ambient = self.drone.next_sample(now);
        let tension = self.tension.next_sample(now);
        let out = self.ambient_bus.process(ambient, now) + self.tension_bus.process(tension, now);
        self.frames += 1;
        out.clamp(-1.0, 1.0)
    }

    pub fn render(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.next_sample();
        }
    }
}

pub type SharedGraph = Arc<Mutex<SynthGraph>>;

const BLOCK_SIZE: usize = 256;

/// Mono rodio source pulling blocks from the graph. Ends quietly once the
/// graph has been dropped.
pub struct GraphSource {
    graph: Weak<Mutex<SynthGraph>>,
    sample_rate: u32,
    block: Vec<f32>,
    position: usize,
}

impl GraphSource {
    pub fn new(graph: Weak<Mutex<SynthGraph>>, sample_rate: u32) -> Self {
        Self {
            graph,
            sample_rate,
            block: vec![0.0; BLOCK_SIZE],
            position: BLOCK_SIZE,
        }
    }

    fn refill(&mut self) -> bool {
        let Some(graph) = self.graph.upgrade() else {
            return false;
        };
        let Ok(mut graph) = graph.lock() else {
            return false;
        };
        graph.render(&mut self.block);
        self.position = 0;
        true
    }
}

impl Iterator for GraphSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.block.len() && !self.refill() {
            return None;
        }
        let sample = self.block[self.position];
        self.position += 1;
        Some(sample)
    }
}

impl Source for GraphSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }
    fn channels(&self) -> u16 {
        1
    }
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Where rendered audio goes. Resuming may fail (no device, platform
/// policy) and is retried by the caller on the next user gesture.
pub trait OutputBackend {
    fn resume(&mut self, source: GraphSource) -> Result<(), AudioError>;
    fn is_running(&self) -> bool;
    fn play_cue(&mut self, cue: MadnessCue) -> Result<(), AudioError>;
    fn close(&mut self);
}

/// Default output device through rodio.
#[derive(Default)]
pub struct RodioOutput {
    stream: Option<(OutputStream, OutputStreamHandle)>,
    sink: Option<Sink>,
}

impl RodioOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputBackend for RodioOutput {
    fn resume(&mut self, source: GraphSource) -> Result<(), AudioError> {
        if self.is_running() {
            return Ok(());
        }
        let (stream, handle) = OutputStream::try_default()?;
        let sink = Sink::try_new(&handle)?;
        sink.append(source);
        self.sink = Some(sink);
        self.stream = Some((stream, handle));
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.sink.as_ref().is_some_and(|s| !s.empty())
    }

    fn play_cue(&mut self, cue: MadnessCue) -> Result<(), AudioError> {
        let Some((_, handle)) = self.stream.as_ref() else {
            return Err(AudioError::Suspended);
        };
        let sink = Sink::try_new(handle)?;
        sink.append(cue);
        sink.detach();
        Ok(())
    }

    fn close(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.stream = None;
    }
}

/// Output that renders nothing. Used for headless runs and tests; can be
/// told to refuse the first few resumes the way a locked platform would.
#[derive(Debug, Default)]
pub struct NullOutput {
    refusals_left: usize,
    running: bool,
    pub resume_attempts: usize,
    pub cues_played: usize,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing(times: usize) -> Self {
        Self {
            refusals_left: times,
            ..Self::default()
        }
    }
}

impl OutputBackend for NullOutput {
    fn resume(&mut self, _source: GraphSource) -> Result<(), AudioError> {
        self.resume_attempts += 1;
        if self.refusals_left > 0 {
            self.refusals_left -= 1;
            return Err(AudioError::Suspended);
        }
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn play_cue(&mut self, _cue: MadnessCue) -> Result<(), AudioError> {
        if !self.running {
            return Err(AudioError::Suspended);
        }
        self.cues_played += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.running = false;
    }
}

/// The handle could not be built. The output is handed back untouched so a
/// later attempt can use it.
#[derive(Error)]
#[error("{error}")]
pub struct CreateError {
    #[source]
    pub error: AudioError,
    pub output: Box<dyn OutputBackend>,
}

impl fmt::Debug for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Owns the graph, its step clock and its output for one session.
pub struct AudioGraphHandle {
    graph: SharedGraph,
    sequencer: StepTimer,
    output: Box<dyn OutputBackend>,
    closed: bool,
}

impl AudioGraphHandle {
    /// Build every node, start the step clock and keep `output` for resuming.
    pub fn create(config: &AudioConfig, output: Box<dyn OutputBackend>) -> Result<Self, CreateError> {
        Self::create_with_clock(config, output, spawn_sequencer)
    }

    /// Like [`AudioGraphHandle::create`] with a custom step clock starter.
    pub fn create_with_clock<F>(
        config: &AudioConfig,
        output: Box<dyn OutputBackend>,
        start_clock: F,
    ) -> Result<Self, CreateError>
    where
        F: FnOnce(Weak<Mutex<SynthGraph>>, Duration) -> Result<StepTimer, AudioError>,
    {
        let graph = Arc::new(Mutex::new(SynthGraph::new(config.sample_rate)));
        let sequencer = match start_clock(Arc::downgrade(&graph), config.step_interval()) {
            Ok(timer) => timer,
            Err(error) => return Err(CreateError { error, output }),
        };
        log::info!(
            "[speechoke][audio] context-created sample_rate={} step_ms={}",
            config.sample_rate,
            config.step_ms
        );
        Ok(Self {
            graph,
            sequencer,
            output,
            closed: false,
        })
    }

    pub fn is_audible(&self) -> bool {
        self.output.is_running()
    }

    pub fn sequencer_running(&self) -> bool {
        self.sequencer.is_running()
    }

    /// Start pulling audio if the output is not already running.
    pub fn resume(&mut self) -> Result<(), AudioError> {
        if self.closed || self.output.is_running() {
            return Ok(());
        }
        let sample_rate = self.with_graph(|g| g.sample_rate()).ok_or(AudioError::Closed)?;
        self.output
            .resume(GraphSource::new(Arc::downgrade(&self.graph), sample_rate))
    }

    pub fn apply_mix(&self, targets: GainTargets, time_constant: f64) {
        if self.with_graph(|g| g.retarget(targets, time_constant)).is_none() {
            log::warn!("[speechoke][audio] graph unavailable, mix update dropped");
        }
    }

    pub fn play_cue(&mut self, cue: MadnessCue) -> Result<(), AudioError> {
        self.output.play_cue(cue)
    }

    /// Run `f` with the graph locked; `None` if the lock is poisoned.
    pub fn with_graph<R>(&self, f: impl FnOnce(&mut SynthGraph) -> R) -> Option<R> {
        self.graph.lock().ok().map(|mut g| f(&mut g))
    }

    /// Cancel the step clock and release the output. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.sequencer.cancel();
        self.output.close();
        self.closed = true;
        log::info!("[speechoke][audio] context-closed");
    }
}

impl Drop for AudioGraphHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Step clock that plays the graph's next step on every tick and stops by
/// itself once the graph is gone.
fn spawn_sequencer(graph: Weak<Mutex<SynthGraph>>, interval: Duration) -> Result<StepTimer, AudioError> {
    StepTimer::spawn(interval, move || {
        let Some(graph) = graph.upgrade() else {
            return false;
        };
        let Ok(mut graph) = graph.lock() else {
            return false;
        };
        graph.advance_step();
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn seconds(graph: &mut SynthGraph, secs: f64) {
        let mut buf = vec![0.0; (secs * graph.sample_rate() as f64) as usize];
        graph.render(&mut buf);
    }

    #[test]
    fn silent_until_a_bus_opens() {
        let mut graph = SynthGraph::new(8000);
        let mut buf = vec![0.0; 4000];
        graph.render(&mut buf);
        assert!(buf.iter().all(|s| *s == 0.0));
        assert_abs_diff_eq!(graph.current_time(), 0.5);
    }

    #[test]
    fn retarget_ramps_with_time_constant() {
        let mut graph = SynthGraph::new(8000);
        graph.retarget(GainTargets { ambient: 0.05, tension: 0.0 }, 0.5);
        seconds(&mut graph, 0.5);
        let (ambient, tension) = graph.bus_gains();
        assert_abs_diff_eq!(ambient, 0.05 * (1.0 - (-1.0f32).exp()), epsilon = 1e-3);
        assert_eq!(tension, 0.0);
    }

    #[test]
    fn frozen_clock_does_not_stack_steps() {
        let mut graph = SynthGraph::new(8000);
        assert!(graph.advance_step().is_some());
        assert!(graph.advance_step().is_none());
        assert_eq!(graph.sequencer_step(), 1);
        seconds(&mut graph, 0.25);
        assert!(graph.advance_step().is_some());
    }

    #[test]
    fn source_ends_when_graph_dropped() {
        let graph = Arc::new(Mutex::new(SynthGraph::new(8000)));
        let mut source = GraphSource::new(Arc::downgrade(&graph), 8000);
        assert_eq!(source.next(), Some(0.0));
        drop(graph);
        let rest: Vec<f32> = source.by_ref().collect();
        assert_eq!(rest.len(), BLOCK_SIZE - 1);
        assert_eq!(source.next(), None);
    }

    #[test]
    fn failed_step_clock_hands_the_output_back() {
        let config = AudioConfig {
            step_ms: 5,
            ..AudioConfig::default()
        };
        let failed = AudioGraphHandle::create_with_clock(&config, Box::new(NullOutput::new()), |_, _| {
            Err(AudioError::Thread(std::io::Error::other("no threads left")))
        })
        .err()
        .unwrap();
        assert!(matches!(failed.error, AudioError::Thread(_)));

        let mut handle = AudioGraphHandle::create(&config, failed.output).unwrap();
        handle.resume().unwrap();
        assert!(handle.is_audible());
        handle.close();
    }

    #[test]
    fn closing_handle_stops_step_clock() {
        let config = AudioConfig {
            step_ms: 5,
            ..AudioConfig::default()
        };
        let mut handle = AudioGraphHandle::create(&config, Box::new(NullOutput::new())).unwrap();
        assert!(handle.sequencer_running());
        handle.resume().unwrap();
        assert!(handle.is_audible());
        handle.close();
        handle.close();
        assert!(!handle.sequencer_running());
        assert!(!handle.is_audible());
    }
}
