//! Fixed-tempo step clock for the tension bed.
//!
//! The musical content is a pure function of the step index ([`step_event`]),
//! cyclic with period [`PATTERN_LENGTH`]. [`StepTimer`] is the wall-clock
//! trigger: a background thread ticking every [`STEP_INTERVAL`] until it is
//! cancelled or its callback reports that its resources are gone.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};

use super::AudioError;

/// 120 BPM eighth notes.
pub const STEP_INTERVAL: Duration = Duration::from_millis(250);
pub const PATTERN_LENGTH: usize = 8;

pub const NOTE_PATTERN: [f32; PATTERN_LENGTH] =
    [329.63, 392.0, 440.0, 392.0, 523.25, 493.88, 440.0, 392.0];
pub const BASS_PATTERN: [f32; PATTERN_LENGTH] =
    [82.41, 82.41, 92.5, 92.5, 98.0, 98.0, 92.5, 92.5];

/// Lead portamento time constant (s).
pub const LEAD_GLIDE: f64 = 0.015;
/// Bass portamento time constant (s).
pub const BASS_GLIDE: f64 = 0.04;
/// Hi-hat lands this long after the step (s), on the off-beat.
pub const HAT_OFFSET: f64 = 0.12;

/// What one step plays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEvent {
    pub step: usize,
    pub note_hz: f32,
    pub bass_hz: f32,
    pub kick: bool,
    pub hat_offset: f64,
}

/// Look up the content of step `step`; `step` and `step + 8` are identical.
pub fn step_event(step: usize) -> StepEvent {
    let i = step % PATTERN_LENGTH;
    StepEvent {
        step: i,
        note_hz: NOTE_PATTERN[i],
        bass_hz: BASS_PATTERN[i],
        kick: i % 2 == 0,
        hat_offset: HAT_OFFSET,
    }
}

/// Step counter owned by the synth graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerState {
    step: usize,
}

impl SequencerState {
    /// Index of the step the next tick will play.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Emit the current step and advance, wrapping at the pattern length.
    pub fn tick(&mut self) -> StepEvent {
        let event = step_event(self.step);
        self.step = (self.step + 1) % PATTERN_LENGTH;
        event
    }
}

/// Cancellable fixed-interval trigger running on its own thread.
pub struct StepTimer {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StepTimer {
    /// Call `on_tick` every `interval` until cancelled. Returning `false`
    /// from the callback ends the timer from the inside.
    pub fn spawn<F>(interval: Duration, mut on_tick: F) -> Result<Self, AudioError>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(interval);
        let handle = thread::Builder::new()
            .name("speechoke-step-clock".into())
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => {
                        if !on_tick() {
                            log::debug!("[speechoke][audio] step clock lost its graph, exiting");
                            break;
                        }
                    }
                    recv(stop_rx) -> _ => break,
                }
            })
            .map_err(AudioError::Thread)?;
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the timer and wait for its thread. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("[speechoke][audio] step clock thread panicked");
            }
        }
    }
}

impl Drop for StepTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn pattern_is_cyclic() {
        for n in 0..32 {
            assert_eq!(step_event(n).note_hz, step_event(n + 8).note_hz);
            assert_eq!(step_event(n).bass_hz, step_event(n + 8).bass_hz);
        }
    }

    #[test]
    fn kick_only_on_even_steps() {
        let kicks: Vec<bool> = (0..8).map(|n| step_event(n).kick).collect();
        assert_eq!(kicks, [true, false, true, false, true, false, true, false]);
    }

    #[test]
    fn state_plays_current_step_then_wraps() {
        let mut state = SequencerState::default();
        let first = state.tick();
        assert_eq!(first.step, 0);
        assert_eq!(first.note_hz, 329.63);
        for _ in 0..7 {
            state.tick();
        }
        assert_eq!(state.step(), 0);
        assert_eq!(state.tick(), first);
    }

    #[test]
    fn timer_ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let mut timer = StepTimer::spawn(Duration::from_millis(5), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            true
        })
        .unwrap();
        thread::sleep(Duration::from_millis(60));
        timer.cancel();
        let after_cancel = count.load(Ordering::SeqCst);
        assert!(after_cancel > 0);
        assert!(!timer.is_running());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
        timer.cancel();
    }

    #[test]
    fn timer_exits_when_callback_declines() {
        let mut timer = StepTimer::spawn(Duration::from_millis(2), || false).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(!timer.is_running());
        timer.cancel();
    }
}
