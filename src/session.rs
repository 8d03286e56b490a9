//! One performance: microphone, level meter, visualizer and recorder.
//!
//! A session exists only after the microphone was acquired, so a failed
//! acquisition leaves nothing behind. Every frame drains the microphone once
//! and fans the chunks out to the analysers and the recorder.

use std::sync::Arc;

use atomic_float::AtomicF32;

use crate::analysis::{AnalysisConfig, Bar, FrequencyVisualizer, InputLevelMeter};
use crate::capture::{AudioRecorder, CaptureError, Microphone, RecordedTake};
use crate::critique::{critique_or_fallback, CritiqueRequest, CritiqueResult, CritiqueService};
use crate::script::Script;

pub struct PerformanceSession {
    microphone: Microphone,
    recorder: AudioRecorder,
    meter: InputLevelMeter,
    visualizer: FrequencyVisualizer,
    last_level: f32,
}

impl PerformanceSession {
    /// Acquire the microphone through `acquire` and start level tracking.
    pub fn begin<F>(config: &AnalysisConfig, acquire: F) -> Result<Self, CaptureError>
    where
        F: FnOnce() -> Result<Microphone, CaptureError>,
    {
        let microphone = acquire()?;
        let mut meter = InputLevelMeter::new(config);
        meter.start();
        Ok(Self {
            microphone,
            recorder: AudioRecorder::new(),
            meter,
            visualizer: FrequencyVisualizer::new(),
            last_level: 0.0,
        })
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn level(&self) -> f32 {
        self.last_level
    }

    pub fn level_handle(&self) -> Arc<AtomicF32> {
        self.meter.level_handle()
    }

    pub fn start_recording(&mut self) {
        self.recorder.start(&self.microphone);
    }

    fn pump(&mut self) {
        for chunk in self.microphone.drain() {
            self.meter.feed(&chunk);
            self.visualizer.feed(&chunk);
            self.recorder.push_chunk(chunk);
        }
    }

    /// Per-frame work; returns the smoothed input level.
    pub fn frame(&mut self) -> f32 {
        self.pump();
        self.last_level = self.meter.frame().unwrap_or(0.0);
        self.last_level
    }

    pub fn bars(&mut self) -> Vec<Bar> {
        self.visualizer.bars()
    }

    /// Stop recording and finalize the take. A no-op returning `Ok(None)`
    /// when nothing is being recorded.
    pub fn finish(&mut self) -> Result<Option<RecordedTake>, CaptureError> {
        if !self.is_recording() {
            return Ok(None);
        }
        self.microphone.release();
        // Chunks delivered before the stream stopped still belong to the take.
        self.pump();
        self.meter.stop();
        self.visualizer.reset();
        self.last_level = 0.0;
        self.recorder.stop()
    }

    /// Finish and hand the take to `service`. `None` when nothing was being
    /// recorded; an encoding failure still yields the fallback scorecard.
    pub fn finish_and_critique(
        &mut self,
        script: &Script,
        service: &dyn CritiqueService,
    ) -> Option<CritiqueResult> {
        match self.finish() {
            Ok(None) => None,
            Ok(Some(take)) => {
                let request = CritiqueRequest::new(&script.title, &script.text, &take);
                Some(critique_or_fallback(service, &request))
            }
            Err(err) => {
                log::error!("[speechoke][capture] could not finalize take: {err}");
                Some(CritiqueResult::fallback())
            }
        }
    }

    /// Leave without finalizing anything.
    pub fn abort(mut self) {
        self.meter.stop();
        self.microphone.release();
    }
}
