//! Teleprompter scroll math.
//!
//! Scrolling is a pure step function: given the previous [`ScrollState`] and
//! one [`Frame`] of input it returns the next state. [`ScrollAnimator`] keeps
//! that state between frames and handles play/pause and text changes; any
//! render loop can drive it.

use serde::Deserialize;

/// Tunables of the `[teleprompter]` config section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TeleprompterConfig {
    /// Scroll rate at speed 1.0.
    pub base_pixels_per_second: f32,
    pub default_speed: f32,
    pub min_speed: f32,
    pub max_speed: f32,
}

impl Default for TeleprompterConfig {
    fn default() -> Self {
        Self {
            base_pixels_per_second: 60.0,
            default_speed: 1.5,
            min_speed: 0.5,
            max_speed: 3.0,
        }
    }
}

impl TeleprompterConfig {
    /// Clamp into `[min_speed, max_speed]`.
    pub fn clamp_speed(&self, speed: f32) -> f32 {
        speed.max(self.min_speed).min(self.max_speed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollState {
    pub offset: f32,
    /// Timestamp (s) of the previous frame of this run; `None` right after
    /// starting, resuming or a text change.
    pub last_frame: Option<f64>,
}

/// Everything one animation frame knows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Frame timestamp in seconds, monotonic.
    pub now: f64,
    pub pixels_per_second: f32,
    pub content_height: f32,
    pub viewport_height: f32,
}

/// Largest reachable offset; zero when the content fits.
pub fn max_offset(content_height: f32, viewport_height: f32) -> f32 {
    (content_height - viewport_height).max(0.0)
}

/// Advance by the time since the previous frame. The first frame of a run
/// only records its timestamp.
pub fn advance(state: ScrollState, frame: &Frame) -> ScrollState {
    let bound = max_offset(frame.content_height, frame.viewport_height);
    let elapsed = match state.last_frame {
        Some(last) => (frame.now - last).max(0.0) as f32,
        None => 0.0,
    };
    let offset = if bound <= 0.0 {
        0.0
    } else {
        (state.offset + frame.pixels_per_second * elapsed).clamp(0.0, bound)
    };
    ScrollState {
        offset,
        last_frame: Some(frame.now),
    }
}

/// Text shadow radius (px) for the current smoothed input volume.
pub fn glow_radius(volume: f32) -> Option<f32> {
    (volume > 0.1).then(|| volume * 10.0)
}

/// Paragraphs are separated by blank lines.
pub fn paragraphs(text: &str) -> Vec<&str> {
    text.split("\n\n").collect()
}

pub struct ScrollAnimator {
    config: TeleprompterConfig,
    state: ScrollState,
    speed: f32,
    playing: bool,
}

impl ScrollAnimator {
    pub fn new(config: TeleprompterConfig) -> Self {
        let speed = config.clamp_speed(config.default_speed);
        Self {
            config,
            state: ScrollState::default(),
            speed,
            playing: false,
        }
    }

    pub fn offset(&self) -> f32 {
        self.state.offset
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = self.config.clamp_speed(speed);
    }

    pub fn pixels_per_second(&self) -> f32 {
        self.config.base_pixels_per_second * self.speed
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// New script: back to the top, whether playing or not.
    pub fn set_text(&mut self) {
        self.state = ScrollState::default();
    }

    pub fn play(&mut self) {
        if !self.playing {
            self.playing = true;
            self.state.last_frame = None;
        }
    }

    /// Start a fresh run from the top of the script.
    pub fn restart(&mut self) {
        self.state = ScrollState::default();
        self.playing = false;
        self.play();
    }

    /// Freeze in place. The next run starts a fresh time baseline.
    pub fn pause(&mut self) {
        self.playing = false;
        self.state.last_frame = None;
    }

    /// Run one frame; returns the offset to render.
    pub fn frame(&mut self, now: f64, content_height: f32, viewport_height: f32) -> f32 {
        if self.playing {
            let frame = Frame {
                now,
                pixels_per_second: self.pixels_per_second(),
                content_height,
                viewport_height,
            };
            self.state = advance(self.state, &frame);
        }
        self.state.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn frame(now: f64) -> Frame {
        Frame {
            now,
            pixels_per_second: 90.0,
            content_height: 3000.0,
            viewport_height: 800.0,
        }
    }

    #[test]
    fn first_frame_does_not_jump() {
        let state = advance(ScrollState::default(), &frame(1234.5));
        assert_eq!(state.offset, 0.0);
        assert_eq!(state.last_frame, Some(1234.5));
    }

    #[test]
    fn one_second_at_ninety_px() {
        let state = advance(ScrollState::default(), &frame(10.0));
        let state = advance(state, &frame(11.0));
        assert_abs_diff_eq!(state.offset, 90.0);
    }

    #[test]
    fn holds_at_the_bound() {
        let start = ScrollState {
            offset: 2190.0,
            last_frame: Some(0.0),
        };
        let state = advance(start, &frame(1.0));
        assert_eq!(state.offset, 2200.0);
        let state = advance(state, &frame(5.0));
        assert_eq!(state.offset, 2200.0);
    }

    #[test]
    fn short_content_never_scrolls() {
        let f = Frame {
            content_height: 500.0,
            ..frame(1.0)
        };
        let state = advance(ScrollState { offset: 0.0, last_frame: Some(0.0) }, &f);
        assert_eq!(state.offset, 0.0);
    }

    #[test]
    fn clock_going_backwards_is_ignored() {
        let start = ScrollState {
            offset: 100.0,
            last_frame: Some(5.0),
        };
        assert_eq!(advance(start, &frame(4.0)).offset, 100.0);
    }

    #[test]
    fn pause_freezes_and_resume_drops_stale_delta() {
        let mut animator = ScrollAnimator::new(TeleprompterConfig::default());
        animator.set_speed(1.0);
        animator.play();
        animator.frame(0.0, 3000.0, 800.0);
        animator.frame(1.0, 3000.0, 800.0);
        assert_abs_diff_eq!(animator.offset(), 60.0);

        animator.pause();
        assert_abs_diff_eq!(animator.frame(30.0, 3000.0, 800.0), 60.0);

        animator.play();
        animator.frame(40.0, 3000.0, 800.0);
        assert_abs_diff_eq!(animator.offset(), 60.0);
        animator.frame(40.5, 3000.0, 800.0);
        assert_abs_diff_eq!(animator.offset(), 90.0);
    }

    #[test]
    fn text_change_resets_even_while_paused() {
        let mut animator = ScrollAnimator::new(TeleprompterConfig::default());
        animator.play();
        animator.frame(0.0, 3000.0, 800.0);
        animator.frame(2.0, 3000.0, 800.0);
        animator.pause();
        assert!(animator.offset() > 0.0);
        animator.set_text();
        assert_eq!(animator.offset(), 0.0);
    }

    #[test]
    fn restart_after_a_finished_run_starts_at_the_top() {
        let mut animator = ScrollAnimator::new(TeleprompterConfig::default());
        animator.play();
        animator.frame(0.0, 3000.0, 800.0);
        animator.frame(60.0, 3000.0, 800.0);
        assert_eq!(animator.offset(), 2200.0);
        animator.pause();

        animator.restart();
        assert!(animator.is_playing());
        assert_eq!(animator.frame(100.0, 3000.0, 800.0), 0.0);
        animator.frame(101.0, 3000.0, 800.0);
        assert_abs_diff_eq!(animator.offset(), 90.0);
    }

    #[test]
    fn default_speed_moves_ninety_px_per_second() {
        let mut animator = ScrollAnimator::new(TeleprompterConfig::default());
        assert_eq!(animator.speed(), 1.5);
        animator.play();
        animator.frame(0.0, 3000.0, 800.0);
        assert_abs_diff_eq!(animator.frame(1.0, 3000.0, 800.0), 90.0);
    }

    #[test]
    fn speed_is_clamped() {
        let mut animator = ScrollAnimator::new(TeleprompterConfig::default());
        assert_eq!(animator.speed(), 1.5);
        animator.set_speed(10.0);
        assert_eq!(animator.speed(), 3.0);
        animator.set_speed(0.1);
        assert_eq!(animator.speed(), 0.5);
    }

    #[test]
    fn glow_only_above_threshold() {
        assert_eq!(glow_radius(0.05), None);
        assert_eq!(glow_radius(0.1), None);
        assert_abs_diff_eq!(glow_radius(0.5).unwrap(), 5.0);
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        assert_eq!(paragraphs("a\nb\n\nc"), vec!["a\nb", "c"]);
    }
}
