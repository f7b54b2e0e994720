// SPDX-License-Identifier: GPL-3.0-only

//! Test doubles shared by the session integration tests

#![allow(dead_code)]

use camera_session::backends::camera::types::{
    AudioSample, NegotiatedFormat, PixelLayout, RawFrame, Resolution,
};
use camera_session::backends::camera::{CaptureSource, FrameSink};
use camera_session::backends::display::{TextureId, TextureRegistrar};
use camera_session::config::{CameraConfig, SessionSettings};
use camera_session::pipelines::photo::PhotoEncoder;
use camera_session::pipelines::video::{MediaWriter, RecordingFormat, WriterFactory};
use camera_session::session::{
    self, CameraSession, EventReceiver, SessionEvent, SessionServices, SessionState,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds or `WAIT` elapses
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[derive(Default)]
struct ManualState {
    sink: Mutex<Option<Arc<dyn FrameSink>>>,
    fail_open: Mutex<Option<String>>,
    fail_start: Mutex<Option<String>>,
    opens: AtomicUsize,
    stopped: AtomicBool,
}

/// Capture source driven by the test thread, which acts as the producer
pub struct ManualSource {
    state: Arc<ManualState>,
    format: NegotiatedFormat,
}

/// Test-side handle to a [`ManualSource`]
#[derive(Clone)]
pub struct ManualHandle {
    state: Arc<ManualState>,
}

impl ManualSource {
    pub fn new(width: u32, height: u32) -> (Self, ManualHandle) {
        let state = Arc::new(ManualState::default());
        let source = Self {
            state: Arc::clone(&state),
            format: NegotiatedFormat {
                resolution: Resolution::new(width, height),
                fps: 25,
                layout: PixelLayout::Bgra,
                audio: None,
            },
        };
        (source, ManualHandle { state })
    }
}

impl CaptureSource for ManualSource {
    fn name(&self) -> &str {
        "manual"
    }

    fn open(&mut self, _config: &CameraConfig) -> Result<NegotiatedFormat, String> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.state.fail_open.lock().unwrap().take() {
            return Err(reason);
        }
        Ok(self.format)
    }

    fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), String> {
        if let Some(reason) = self.state.fail_start.lock().unwrap().take() {
            return Err(reason);
        }
        *self.state.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        // Waits for a frame in flight, like joining a producer thread
        self.state.sink.lock().unwrap().take();
        self.state.stopped.store(true, Ordering::SeqCst);
    }
}

impl ManualHandle {
    pub fn fail_next_open(&self, reason: &str) {
        *self.state.fail_open.lock().unwrap() = Some(reason.to_string());
    }

    pub fn fail_next_start(&self, reason: &str) {
        *self.state.fail_start.lock().unwrap() = Some(reason.to_string());
    }

    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.state.sink.lock().unwrap().is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    pub fn wait_started(&self) -> bool {
        wait_until(|| self.is_started())
    }

    /// Deliver a solid frame; false if the source is not started
    pub fn push_frame(&self, width: u32, height: u32, fill: u8) -> bool {
        let pixels = vec![fill; (width * height * 4) as usize];
        self.push_pixels(width, height, &pixels)
    }

    /// Deliver packed pixels as they are
    pub fn push_pixels(&self, width: u32, height: u32, pixels: &[u8]) -> bool {
        let sink = self.state.sink.lock().unwrap();
        match sink.as_ref() {
            Some(sink) => {
                sink.on_frame(RawFrame::packed(pixels, width, height));
                true
            }
            None => false,
        }
    }

    pub fn push_audio(&self, sample: AudioSample) -> bool {
        let sink = self.state.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => {
                sink.on_audio(sample);
                true
            }
            None => false,
        }
    }

    /// Report an error from a producer-side thread, as a real source would
    pub fn push_error(&self, description: &str) -> bool {
        let sink = self.state.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => {
                sink.on_error(description.to_string());
                true
            }
            None => false,
        }
    }

    pub fn end_stream(&self) -> bool {
        let sink = self.state.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => {
                sink.on_end_of_stream();
                true
            }
            None => false,
        }
    }
}

/// Registrar that counts calls
#[derive(Default)]
pub struct CountingRegistrar {
    pub registered: AtomicUsize,
    pub marked: AtomicUsize,
    pub unregistered: AtomicUsize,
}

impl TextureRegistrar for CountingRegistrar {
    fn register(&self) -> TextureId {
        self.registered.fetch_add(1, Ordering::SeqCst) as TextureId + 100
    }

    fn mark_frame_available(&self, _id: TextureId) {
        self.marked.fetch_add(1, Ordering::SeqCst);
    }

    fn unregister(&self, _id: TextureId) {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
    }
}

/// What the in-memory writers of one harness saw
#[derive(Debug, Default)]
pub struct WriterLog {
    pub configured: Vec<(RecordingFormat, PathBuf)>,
    pub video_timestamps: Vec<Duration>,
    pub audio_samples: usize,
    pub finalized: Vec<PathBuf>,
    pub discarded: usize,
    /// Fail the write of this many-th video frame (1-based)
    pub fail_on_frame: Option<usize>,
    /// Hold finalize for this long
    pub finalize_delay: Duration,
}

pub struct MemoryWriter {
    log: Arc<Mutex<WriterLog>>,
    output: Option<PathBuf>,
}

impl MediaWriter for MemoryWriter {
    fn extension(&self) -> &'static str {
        "mem"
    }

    fn configure(&mut self, format: &RecordingFormat, output: &Path) -> Result<(), String> {
        self.log
            .lock()
            .unwrap()
            .configured
            .push((*format, output.to_path_buf()));
        self.output = Some(output.to_path_buf());
        Ok(())
    }

    fn write_video_frame(&mut self, _pixels: &[u8], timestamp: Duration) -> Result<(), String> {
        let mut log = self.log.lock().unwrap();
        log.video_timestamps.push(timestamp);
        if log.fail_on_frame == Some(log.video_timestamps.len()) {
            return Err("disk full".to_string());
        }
        Ok(())
    }

    fn write_audio_sample(&mut self, _sample: &AudioSample, _ts: Duration) -> Result<(), String> {
        self.log.lock().unwrap().audio_samples += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<PathBuf, String> {
        let delay = self.log.lock().unwrap().finalize_delay;
        std::thread::sleep(delay);
        let output = self
            .output
            .take()
            .ok_or_else(|| "not configured".to_string())?;
        self.log.lock().unwrap().finalized.push(output.clone());
        Ok(output)
    }

    fn discard(&mut self) {
        self.output = None;
        self.log.lock().unwrap().discarded += 1;
    }
}

pub fn memory_writer_factory(log: &Arc<Mutex<WriterLog>>) -> WriterFactory {
    let log = Arc::clone(log);
    Arc::new(move || {
        Box::new(MemoryWriter {
            log: Arc::clone(&log),
            output: None,
        }) as Box<dyn MediaWriter>
    })
}

/// Photo encoder that keeps the pixels it was handed
#[derive(Default)]
pub struct CapturingEncoder {
    pub encoded: Mutex<Vec<Vec<u8>>>,
}

impl PhotoEncoder for CapturingEncoder {
    fn extension(&self) -> &'static str {
        "raw"
    }

    fn encode(
        &self,
        pixels: &[u8],
        _width: u32,
        _height: u32,
        _layout: PixelLayout,
    ) -> Result<Vec<u8>, String> {
        self.encoded.lock().unwrap().push(pixels.to_vec());
        Ok(pixels.to_vec())
    }
}

/// Pixels whose first byte is the column index, `0..width` on every row
pub fn column_ramp(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..height {
        for col in 0..width {
            pixels.extend_from_slice(&[col as u8, 0, 0, 0xFF]);
        }
    }
    pixels
}

/// First byte of each pixel in the first row
pub fn first_row_columns(pixels: &[u8], width: u32) -> Vec<u8> {
    pixels
        .chunks_exact(4)
        .take(width as usize)
        .map(|px| px[0])
        .collect()
}

/// A session over a manual source with counting collaborators
pub struct Harness {
    pub session: CameraSession,
    pub source: ManualHandle,
    pub registrar: Arc<CountingRegistrar>,
    pub writer_log: Arc<Mutex<WriterLog>>,
    pub events: EventReceiver,
    pub output_dir: tempfile::TempDir,
    pub width: u32,
    pub height: u32,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(64, 48, |_| {})
    }

    pub fn with_settings(
        width: u32,
        height: u32,
        adjust: impl FnOnce(&mut SessionSettings),
    ) -> Self {
        Self::build(width, height, adjust, None, None)
    }

    /// Record through `factory` instead of the in-memory writer
    pub fn with_writer_factory(width: u32, height: u32, factory: WriterFactory) -> Self {
        Self::build(width, height, |_| {}, Some(factory), None)
    }

    /// Encode photos with `encoder` instead of JPEG
    pub fn with_photo_encoder(encoder: Arc<dyn PhotoEncoder>) -> Self {
        Self::build(64, 48, |_| {}, None, Some(encoder))
    }

    fn build(
        width: u32,
        height: u32,
        adjust: impl FnOnce(&mut SessionSettings),
        factory: Option<WriterFactory>,
        encoder: Option<Arc<dyn PhotoEncoder>>,
    ) -> Self {
        let output_dir = tempfile::tempdir().unwrap();
        let mut settings = SessionSettings {
            output_dir: output_dir.path().to_path_buf(),
            ..Default::default()
        };
        adjust(&mut settings);

        let (source, handle) = ManualSource::new(width, height);
        let registrar = Arc::new(CountingRegistrar::default());
        let writer_log = Arc::new(Mutex::new(WriterLog::default()));
        let (tx, events) = session::events::channel();
        let mut services = SessionServices::new(tx)
            .with_registrar(registrar.clone())
            .with_writer_factory(factory.unwrap_or_else(|| memory_writer_factory(&writer_log)));
        if let Some(encoder) = encoder {
            services = services.with_photo_encoder(encoder);
        }
        let session = CameraSession::new(
            1,
            CameraConfig::default(),
            settings,
            Box::new(source),
            services,
        );

        Self {
            session,
            source: handle,
            registrar,
            writer_log,
            events,
            output_dir,
            width,
            height,
        }
    }

    /// Initialize and deliver the first frame
    pub fn running() -> Self {
        let harness = Self::new();
        harness.start();
        harness
    }

    /// Deliver a frame of the negotiated size
    pub fn push(&self, fill: u8) -> bool {
        self.source.push_frame(self.width, self.height, fill)
    }

    pub fn start(&self) -> Resolution {
        let completion = self.session.initialize();
        assert!(self.source.wait_started(), "capture source never started");
        assert!(self.source.push_frame(self.width, self.height, 1));
        let resolution = completion.wait().unwrap();
        assert_eq!(self.session.state(), SessionState::Running);
        resolution
    }

    pub fn wait_for_state(&self, state: SessionState) -> bool {
        wait_until(|| self.session.state() == state)
    }

    /// Next event, waiting up to `WAIT`
    pub fn next_event(&mut self) -> Option<SessionEvent> {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if let Ok(event) = self.events.try_recv() {
                return Some(event);
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        None
    }

    /// Drain everything posted so far
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
