// SPDX-License-Identifier: GPL-3.0-only

//! Test-pattern capture source
//!
//! Produces a moving gradient at the configured rate on its own producer
//! thread. Used by the command line tool when no device is requested and
//! as a deterministic source in tests.

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::types::{
    AudioFormat, AudioSample, NegotiatedFormat, PixelLayout, RawFrame, Resolution,
};
use super::{CaptureSource, FrameSink};
use crate::config::CameraConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Longest uninterrupted sleep between stop-flag checks
const STOP_POLL: Duration = Duration::from_millis(10);

/// Silent PCM emitted alongside frames when audio is enabled
const SYNTHETIC_AUDIO: AudioFormat = AudioFormat {
    sample_rate: 48_000,
    channels: 2,
};

/// Used when the config asks for the device's largest size
const MAX_RESOLUTION: Resolution = Resolution::new(1920, 1080);

pub struct SyntheticSource {
    resolution_override: Option<Resolution>,
    frame_limit: Option<u64>,
    format: Option<NegotiatedFormat>,
    producer: Option<CaptureLoopController>,
}

struct PatternState {
    sink: Arc<dyn FrameSink>,
    format: NegotiatedFormat,
    buffer: Vec<u8>,
    silence: Option<Arc<[u8]>>,
    frame: u64,
    frame_limit: Option<u64>,
    interval: Duration,
    next_deadline: Instant,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            resolution_override: None,
            frame_limit: None,
            format: None,
            producer: None,
        }
    }

    /// Produce frames of this size regardless of the configured preset
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution_override = Some(Resolution::new(width, height));
        self
    }

    /// Report end-of-stream after this many frames
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(&mut self, config: &CameraConfig) -> Result<NegotiatedFormat, String> {
        let resolution = self
            .resolution_override
            .or_else(|| config.resolution.target())
            .unwrap_or(MAX_RESOLUTION);
        if resolution.width == 0 || resolution.height == 0 {
            return Err(format!("Unsupported resolution {resolution}"));
        }

        let format = NegotiatedFormat {
            resolution,
            fps: config.effective_fps(),
            layout: PixelLayout::Bgra,
            audio: config.enable_audio.then_some(SYNTHETIC_AUDIO),
        };
        info!(resolution = %resolution, fps = format.fps, "Synthetic source opened");
        self.format = Some(format);
        Ok(format)
    }

    fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), String> {
        let format = self
            .format
            .ok_or_else(|| "Synthetic source started before open".to_string())?;
        if self.producer.is_some() {
            return Err("Synthetic source already started".to_string());
        }

        let silence = format.audio.map(|audio| {
            let samples_per_frame = (audio.sample_rate / format.fps.max(1)) as usize;
            Arc::from(vec![0u8; samples_per_frame * usize::from(audio.channels) * 2])
        });
        let interval = Duration::from_nanos(1_000_000_000 / u64::from(format.fps.max(1)));
        let state = PatternState {
            sink,
            format,
            buffer: vec![0; format.resolution.frame_len()],
            silence,
            frame: 0,
            frame_limit: self.frame_limit,
            interval,
            next_deadline: Instant::now(),
        };

        let producer = CaptureLoopController::start("synthetic-capture", state, produce_frame)
            .map_err(|e| format!("Failed to spawn synthetic producer: {e}"))?;
        self.producer = Some(producer);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            debug!("Stopping synthetic source");
            producer.stop();
        }
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn produce_frame(state: &mut PatternState, stop: &AtomicBool) -> LoopAction {
    if !sleep_until(state.next_deadline, stop) {
        return LoopAction::Stop;
    }
    state.next_deadline += state.interval;

    if state.frame_limit.is_some_and(|limit| state.frame >= limit) {
        state.sink.on_end_of_stream();
        return LoopAction::Stop;
    }

    let Resolution { width, height } = state.format.resolution;
    paint_gradient(&mut state.buffer, width, height, state.frame);
    let captured_at = Instant::now();
    state
        .sink
        .on_frame(RawFrame::packed(&state.buffer, width, height));

    if let (Some(silence), Some(audio)) = (&state.silence, state.format.audio) {
        state.sink.on_audio(AudioSample {
            data: Arc::clone(silence),
            format: audio,
            captured_at,
        });
    }

    state.frame += 1;
    LoopAction::Continue
}

/// Returns false if the stop flag was raised while waiting
fn sleep_until(deadline: Instant, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(STOP_POLL));
    }
}

fn paint_gradient(buffer: &mut [u8], width: u32, height: u32, frame: u64) {
    let shift = (frame % 256) as u8;
    for y in 0..height as usize {
        let row = &mut buffer[y * width as usize * 4..(y + 1) * width as usize * 4];
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            px[0] = (x as u8).wrapping_add(shift);
            px[1] = (y as u8).wrapping_add(shift);
            px[2] = shift.wrapping_mul(4);
            px[3] = 0xFF;
        }
    }
}
