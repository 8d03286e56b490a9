//! speechoke: a karaoke-style teleprompter for speeches.
//!
//! The audio side synthesizes two backing beds (a breathing drone and a
//! 120 BPM tension groove) and crossfades between them. The capture side
//! records the performer, meters the input for visual feedback and hands
//! the take to a critique service. Everything except [`app`] is free of
//! rendering concerns and can be driven from tests.
//!
//! # Example
//! ```
//! use speechoke::audio::{gain_targets, AudioConfig, MixMode};
//! use speechoke::teleprompter::{advance, Frame, ScrollState};
//!
//! let targets = gain_targets(MixMode::Ambient, 0.5, &AudioConfig::default());
//! assert!((targets.ambient - 0.05).abs() < 1e-6);
//! assert_eq!(targets.tension, 0.0);
//!
//! let frame = Frame { now: 0.0, pixels_per_second: 60.0, content_height: 3000.0, viewport_height: 800.0 };
//! let state = advance(ScrollState::default(), &frame);
//! let state = advance(state, &Frame { now: 1.0, ..frame });
//! assert_eq!(state.offset, 60.0);
//! ```

pub mod analysis;
pub mod app;
pub mod audio;
pub mod capture;
pub mod config;
pub mod critique;
pub mod script;
pub mod session;
pub mod settings;
pub mod teleprompter;

pub use audio::{AmbientMixer, AudioError, MixMode};
pub use capture::{AudioRecorder, CaptureError, RecordedTake};
pub use config::Config;
pub use critique::{CritiqueResult, CritiqueService};
pub use script::Script;
pub use session::PerformanceSession;
pub use settings::UserSettings;
pub use teleprompter::ScrollAnimator;
