//! Scheduled parameter automation.
//!
//! A [`Param`] is the value of one knob on a signal node (gain, cutoff,
//! frequency). Besides a plain value it accepts a timeline of automation
//! events measured in seconds on the graph clock, and is evaluated once per
//! sample with [`Param::value_at`]. Time must be fed in non-decreasing order.

/// One scheduled automation event.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    SetValue { time: f64, value: f32 },
    LinearRamp { time: f64, value: f32 },
    ExponentialRamp { time: f64, value: f32 },
    SetTarget { time: f64, target: f32, time_constant: f64 },
}

impl Event {
    fn time(&self) -> f64 {
        match *self {
            Event::SetValue { time, .. }
            | Event::LinearRamp { time, .. }
            | Event::ExponentialRamp { time, .. }
            | Event::SetTarget { time, .. } => time,
        }
    }

    /// Moment from which this event overrides whatever curve precedes it.
    /// Ramps take over immediately and interpolate up to their end time.
    fn takes_over_at(&self, anchor_time: f64) -> f64 {
        match *self {
            Event::SetValue { time, .. } | Event::SetTarget { time, .. } => time,
            Event::LinearRamp { .. } | Event::ExponentialRamp { .. } => anchor_time,
        }
    }
}

/// Automatable scalar parameter.
#[derive(Debug, Clone)]
pub struct Param {
    value: f32,
    // Time and value of the last completed event; ramps start from here.
    anchor_time: f64,
    anchor_value: f32,
    events: Vec<Event>,
    // Value captured when the active set-target curve began.
    target_origin: Option<f32>,
}

impl Param {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            anchor_time: 0.0,
            anchor_value: value,
            events: Vec::new(),
            target_origin: None,
        }
    }

    /// Last evaluated value.
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Overwrite the intrinsic value without touching the timeline.
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
        self.anchor_value = value;
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Event::SetValue { time, value });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Event::LinearRamp { time, value });
    }

    /// Exponential approach to `value` ending at `time`. When the start and end
    /// values straddle or touch zero the curve is undefined; the previous value
    /// is held until `time` and then jumps.
    pub fn exponential_ramp_to_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Event::ExponentialRamp { time, value });
    }

    /// First-order approach towards `target` starting at `time`:
    /// `v(t) = target + (v0 - target) * exp(-(t - time) / time_constant)`.
    pub fn set_target_at_time(&mut self, target: f32, time: f64, time_constant: f64) {
        self.insert(Event::SetTarget {
            time,
            target,
            time_constant,
        });
    }

    /// Drop every event scheduled at or after `time`. The parameter holds
    /// whatever value it had reached.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        let before = self.events.len();
        self.events.retain(|e| e.time() < time);
        if self.events.len() != before {
            self.anchor_time = time;
            self.anchor_value = self.value;
        }
    }

    /// Number of events still pending on the timeline.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    fn insert(&mut self, event: Event) {
        let at = self
            .events
            .iter()
            .position(|e| e.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(at, event);
    }

    fn complete(&mut self, time: f64, value: f32) {
        self.value = value;
        self.anchor_time = time;
        self.anchor_value = value;
        self.events.remove(0);
        self.target_origin = None;
    }

    /// Evaluate the timeline at `now` (seconds).
    pub fn value_at(&mut self, now: f64) -> f32 {
        while let Some(&event) = self.events.first() {
            match event {
                Event::SetValue { time, value } => {
                    if now < time {
                        break;
                    }
                    self.complete(time, value);
                }
                Event::LinearRamp { time, value } => {
                    if now >= time {
                        self.complete(time, value);
                        continue;
                    }
                    let span = time - self.anchor_time;
                    if span > 0.0 && now >= self.anchor_time {
                        let frac = ((now - self.anchor_time) / span) as f32;
                        self.value = self.anchor_value + (value - self.anchor_value) * frac;
                    }
                    break;
                }
                Event::ExponentialRamp { time, value } => {
                    if now >= time {
                        self.complete(time, value);
                        continue;
                    }
                    let start = self.anchor_value;
                    let span = time - self.anchor_time;
                    if start * value > 0.0 && span > 0.0 && now >= self.anchor_time {
                        let frac = ((now - self.anchor_time) / span) as f32;
                        self.value = start * (value / start).powf(frac);
                    } else {
                        self.value = start;
                    }
                    break;
                }
                Event::SetTarget {
                    time,
                    target,
                    time_constant,
                } => {
                    if now < time {
                        break;
                    }
                    if let Some(next) = self.events.get(1) {
                        let handover = next.takes_over_at(now);
                        if now >= handover {
                            let reached = self.value;
                            self.complete(handover.max(time), reached);
                            continue;
                        }
                    }
                    let origin = *self.target_origin.get_or_insert(self.value);
                    if time_constant <= 0.0 {
                        self.value = target;
                    } else {
                        let decay = (-(now - time) / time_constant).exp() as f32;
                        self.value = target + (origin - target) * decay;
                    }
                    let settled = (self.value - target).abs() <= 1e-7 * target.abs().max(1.0);
                    if settled && self.events.len() == 1 {
                        self.complete(now, target);
                    }
                    break;
                }
            }
        }
        self.value
    }
}

impl Default for Param {
    fn default() -> Self {
        Self::new(0.0)
    }
}
