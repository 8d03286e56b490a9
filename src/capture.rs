//! Microphone capture and take finalization.
//!
//! [`Microphone`] owns the live input stream and forwards mono chunks over a
//! channel. [`AudioRecorder`] buffers chunks between `start` and `stop` and
//! finalizes them into one in-memory WAV file.

use std::io::Cursor;
use std::time::Duration;

use base64::Engine as _;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{InputCallbackInfo, SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use dasp_sample::ToSample;
use hound::{WavSpec, WavWriter};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no microphone available")]
    NoDevice,
    #[error("microphone refused: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("could not open microphone stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("could not start microphone stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("unsupported input sample format {0}")]
    UnsupportedFormat(SampleFormat),
    #[error("failed to encode take: {0}")]
    Encode(#[from] hound::Error),
}

/// An acquired input stream. Dropping or releasing it stops the hardware.
pub struct Microphone {
    stream: Option<cpal::Stream>,
    chunks: Receiver<Vec<f32>>,
    sample_rate: u32,
}

impl Microphone {
    /// Open the default input device. Fails without side effects when there
    /// is no device or access is denied.
    pub fn acquire() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        log::info!("[speechoke][capture] cpal host: {}", host.id().name());
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
        match device.name() {
            Ok(name) => log::info!("[speechoke][capture] input device: {name}"),
            Err(_) => log::info!("[speechoke][capture] input device: (no name)"),
        }
        let supported = device.default_input_config()?;
        let format = supported.sample_format();
        let config = StreamConfig::from(supported);
        log::info!(
            "[speechoke][capture] format={} sample_rate={} channels={}",
            format,
            config.sample_rate.0,
            config.channels
        );

        let (tx, rx) = unbounded();
        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, tx)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, tx)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, tx)?,
            other => return Err(CaptureError::UnsupportedFormat(other)),
        };
        stream.play()?;
        Ok(Self {
            stream: Some(stream),
            chunks: rx,
            sample_rate: config.sample_rate.0,
        })
    }

    /// A microphone fed by something other than hardware.
    pub fn from_receiver(chunks: Receiver<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            stream: None,
            chunks,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Everything captured since the last call.
    pub fn drain(&self) -> Vec<Vec<f32>> {
        let mut out = Vec::new();
        loop {
            match self.chunks.try_recv() {
                Ok(chunk) => out.push(chunk),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    /// Stop the hardware stream. Already captured chunks can still be drained.
    pub fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log::warn!("[speechoke][capture] pausing input stream failed: {err}");
            }
            log::info!("[speechoke][capture] microphone released");
        }
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.release();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    sender: Sender<Vec<f32>>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + ToSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _info: &InputCallbackInfo| {
            let mono: Vec<f32> = data
                .chunks(channels)
                .map(|frame| frame.iter().map(|&s| s.to_sample_()).sum::<f32>() / channels as f32)
                .collect();
            // Receiver gone means the session ended; the stream is about to stop.
            let _ = sender.send(mono);
        },
        |err| log::error!("[speechoke][capture] stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Recording,
    Stopped,
}

/// A finished take: a mono 16-bit WAV file in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTake {
    pub wav: Vec<u8>,
    pub sample_rate: u32,
    pub frames: usize,
}

impl RecordedTake {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64)
    }

    /// Standard padded base64 of the WAV bytes, ready for transport.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.wav)
    }
}

/// Drop a `data:<mime>;base64,` prefix, keeping only the payload.
pub fn strip_data_url_prefix(encoded: &str) -> &str {
    match encoded.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, payload)| payload),
        None => encoded,
    }
}

pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, CaptureError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for &s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

/// IDLE -> RECORDING -> STOPPED.
#[derive(Debug, Default)]
pub struct AudioRecorder {
    state: CaptureState,
    sample_rate: u32,
    chunks: Vec<Vec<f32>>,
}

impl AudioRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    pub fn buffered_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Begin buffering from `microphone`. No-op while already recording.
    pub fn start(&mut self, microphone: &Microphone) {
        if self.is_recording() {
            return;
        }
        // Whatever queued up before the take started is not part of it.
        microphone.drain();
        self.chunks.clear();
        self.sample_rate = microphone.sample_rate();
        self.state = CaptureState::Recording;
        log::info!("[speechoke][capture] recording started sample_rate={}", self.sample_rate);
    }

    /// Buffer one chunk. Ignored unless recording.
    pub fn push_chunk(&mut self, chunk: Vec<f32>) {
        if self.is_recording() && !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    /// Finalize the take. `Ok(None)` when not recording, so a second stop
    /// never finalizes twice.
    pub fn stop(&mut self) -> Result<Option<RecordedTake>, CaptureError> {
        if !self.is_recording() {
            return Ok(None);
        }
        self.state = CaptureState::Stopped;
        let samples: Vec<f32> = std::mem::take(&mut self.chunks).concat();
        let wav = encode_wav(&samples, self.sample_rate)?;
        log::info!(
            "[speechoke][capture] recording stopped frames={} bytes={}",
            samples.len(),
            wav.len()
        );
        Ok(Some(RecordedTake {
            wav,
            sample_rate: self.sample_rate,
            frames: samples.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_microphone() -> (Sender<Vec<f32>>, Microphone) {
        let (tx, rx) = unbounded();
        (tx, Microphone::from_receiver(rx, 8000))
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let mut recorder = AudioRecorder::new();
        assert_eq!(recorder.stop().unwrap(), None);
        assert_eq!(recorder.state(), CaptureState::Idle);
    }

    #[test]
    fn take_contains_only_chunks_while_recording() {
        let (tx, mic) = fake_microphone();
        let mut recorder = AudioRecorder::new();
        recorder.push_chunk(vec![0.5; 10]);
        tx.send(vec![0.1; 7]).unwrap();

        recorder.start(&mic);
        recorder.start(&mic);
        tx.send(vec![0.25; 100]).unwrap();
        for chunk in mic.drain() {
            recorder.push_chunk(chunk);
        }
        assert_eq!(recorder.buffered_chunks(), 1);

        let take = recorder.stop().unwrap().unwrap();
        assert_eq!(take.frames, 100);
        assert_eq!(take.sample_rate, 8000);
        assert_eq!(recorder.state(), CaptureState::Stopped);
        assert_eq!(recorder.stop().unwrap(), None);
    }

    #[test]
    fn wav_round_trips_through_hound() {
        let wav = encode_wav(&[0.0, 0.5, -1.0, 2.0], 16_000).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, -32767, 32767]);
    }

    #[test]
    fn base64_is_padded_standard_alphabet() {
        let take = RecordedTake {
            wav: vec![0xfb, 0xff],
            sample_rate: 8000,
            frames: 0,
        };
        assert_eq!(take.to_base64(), "+/8=");
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        assert_eq!(strip_data_url_prefix("data:audio/wav;base64,UklGRg=="), "UklGRg==");
        assert_eq!(strip_data_url_prefix("UklGRg=="), "UklGRg==");
    }

    #[test]
    fn released_microphone_still_drains() {
        let (tx, mut mic) = fake_microphone();
        tx.send(vec![1.0]).unwrap();
        mic.release();
        mic.release();
        assert_eq!(mic.drain(), vec![vec![1.0]]);
    }
}
