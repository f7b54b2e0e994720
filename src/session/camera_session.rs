// SPDX-License-Identifier: GPL-3.0-only

//! One open camera and its frame pipeline
//!
//! Commands are issued from the control thread and return [`Completion`]
//! handles; all waiting happens on session-owned threads. Frames arrive on
//! the capture source's producer thread through [`SessionSink`], which only
//! holds a weak reference so a late callback can never keep a disposed
//! session alive.
//!
//! Disposal order:
//! 1. claim `Disposing` (a concurrent caller waits for the first)
//! 2. fail pending commands with `Disposed`
//! 3. abort the recording branch
//! 4. stop the stream channel and detach its doorbell
//! 5. stop the capture source, joining the producer thread
//! 6. release the stream block, the frame ring and the photo snapshot
//! 7. unregister the display texture
//! 8. post `CameraClosing`
//! 9. mark `Disposed`

use super::completion::Completion;
use super::events::{EventSender, SessionEvent};
use super::pending::{OperationKind, PendingOperationTable};
use super::state::{SessionState, StateCell};
use super::tasks::BackgroundTasks;
use super::watchdog::InitWatchdog;
use crate::backends::camera::types::{
    AudioSample, CameraFrame, NegotiatedFormat, PixelLayout, RawFrame, Resolution,
};
use crate::backends::camera::{CaptureSource, FrameSink};
use crate::backends::display::{NoopTextureRegistrar, TextureId, TextureRegistrar};
use crate::config::{CameraConfig, SessionSettings};
use crate::constants::timing;
use crate::errors::{SessionError, SessionResult};
use crate::pipelines::photo::{JpegPhotoEncoder, PhotoEncoder, save_frame};
use crate::pipelines::preview::FrameSlotRing;
use crate::pipelines::stream::{Doorbell, SharedFrameBlock, StreamChannel};
use crate::pipelines::video::{
    BranchState, OnFinished, QueueLimits, QueueStats, RecordingBranch, RecordingFormat,
    RecordingOutcome, WriterFactory, default_writer_factory,
};
use crate::storage;
use crate::sync::lock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Host-provided collaborators of a session
pub struct SessionServices {
    pub events: EventSender,
    pub registrar: Arc<dyn TextureRegistrar>,
    /// JPEG at the configured quality when unset
    pub photo_encoder: Option<Arc<dyn PhotoEncoder>>,
    pub writer_factory: WriterFactory,
}

impl SessionServices {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            registrar: Arc::new(NoopTextureRegistrar::default()),
            photo_encoder: None,
            writer_factory: default_writer_factory(),
        }
    }

    pub fn with_registrar(mut self, registrar: Arc<dyn TextureRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    pub fn with_photo_encoder(mut self, encoder: Arc<dyn PhotoEncoder>) -> Self {
        self.photo_encoder = Some(encoder);
        self
    }

    pub fn with_writer_factory(mut self, factory: WriterFactory) -> Self {
        self.writer_factory = factory;
        self
    }
}

pub struct CameraSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: i64,
    config: CameraConfig,
    settings: SessionSettings,
    state: StateCell,

    capture: Mutex<Option<Box<dyn CaptureSource>>>,
    negotiated: Mutex<Option<NegotiatedFormat>>,
    actual_width: AtomicU32,
    actual_height: AtomicU32,
    first_frame: AtomicBool,
    frame_sequence: AtomicU64,
    mirrored: AtomicBool,

    ring: Arc<FrameSlotRing>,
    stream: StreamChannel,
    recording: RecordingBranch,
    latest: Mutex<Option<Arc<CameraFrame>>>,

    pending: PendingOperationTable,
    watchdog: Mutex<Option<InitWatchdog>>,
    tasks: BackgroundTasks,
    reaper: Mutex<Option<JoinHandle<()>>>,
    teardown_started: AtomicBool,
    disposed: (Mutex<bool>, Condvar),

    texture_id: TextureId,
    registrar: Arc<dyn TextureRegistrar>,
    photo_encoder: Arc<dyn PhotoEncoder>,
    writer_factory: WriterFactory,
    events: EventSender,
}

impl CameraSession {
    /// Create a session in `Created`; registers the display texture
    pub fn new(
        id: i64,
        config: CameraConfig,
        settings: SessionSettings,
        source: Box<dyn CaptureSource>,
        services: SessionServices,
    ) -> Self {
        let texture_id = services.registrar.register();
        let mirrored = config.mirrored;
        let photo_encoder = services
            .photo_encoder
            .unwrap_or_else(|| Arc::new(JpegPhotoEncoder::new(settings.jpeg_quality)));
        let limits = QueueLimits {
            max_video_frames: settings.max_queued_video_frames,
            max_audio_samples: settings.max_queued_audio_samples,
            max_bytes: settings.max_queued_bytes,
        };

        info!(
            camera_id = id,
            source = source.name(),
            texture_id,
            "Camera session created"
        );

        Self {
            inner: Arc::new(SessionInner {
                id,
                config,
                state: StateCell::new(),
                capture: Mutex::new(Some(source)),
                negotiated: Mutex::new(None),
                actual_width: AtomicU32::new(0),
                actual_height: AtomicU32::new(0),
                first_frame: AtomicBool::new(false),
                frame_sequence: AtomicU64::new(0),
                mirrored: AtomicBool::new(mirrored),
                ring: Arc::new(FrameSlotRing::new()),
                stream: StreamChannel::new(id, services.events.clone()),
                recording: RecordingBranch::new(id, limits),
                latest: Mutex::new(None),
                pending: PendingOperationTable::new(),
                watchdog: Mutex::new(None),
                tasks: BackgroundTasks::new(),
                reaper: Mutex::new(None),
                teardown_started: AtomicBool::new(false),
                disposed: (Mutex::new(false), Condvar::new()),
                texture_id,
                registrar: services.registrar,
                photo_encoder,
                writer_factory: services.writer_factory,
                events: services.events,
                settings,
            }),
        }
    }

    pub fn id(&self) -> i64 {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    pub fn texture_id(&self) -> TextureId {
        self.inner.texture_id
    }

    pub fn config(&self) -> &CameraConfig {
        &self.inner.config
    }

    /// Size of the frames actually delivered, known after the first frame
    pub fn actual_resolution(&self) -> Option<Resolution> {
        self.inner.actual_resolution()
    }

    /// Format agreed with the device, known once the source has opened
    pub fn negotiated_format(&self) -> Option<NegotiatedFormat> {
        *lock(&self.inner.negotiated)
    }

    /// Triple buffer read by the display consumer
    pub fn frame_ring(&self) -> Arc<FrameSlotRing> {
        Arc::clone(&self.inner.ring)
    }

    /// Open the capture source and wait for the first frame
    ///
    /// Resolves with the size of the first frame, or fails if the source
    /// cannot be opened or started, reports an error, or produces nothing
    /// within the initialization timeout.
    pub fn initialize(&self) -> Completion<Resolution> {
        let inner = &self.inner;
        if let Err(found) = inner
            .state
            .transition(SessionState::Created, SessionState::Initializing)
        {
            debug!(camera_id = inner.id, state = %found, "Session already initialized");
            return Completion::ready(Err(SessionError::AlreadyInitialized));
        }

        let (tx, completion) = Completion::channel();
        if let Err(e) = inner.pending.insert_init(tx) {
            return Completion::ready(Err(e));
        }

        info!(camera_id = inner.id, device = %inner.config.device, "Initializing camera session");
        let weak = Arc::downgrade(inner);
        let spawned = inner.tasks.spawn(format!("camera-init-{}", inner.id), move || {
            if let Some(inner) = weak.upgrade() {
                inner.run_initialize();
            }
        });
        if !spawned {
            inner.fail_initialization("Failed to start initialization task".to_string());
        }
        completion
    }

    /// Encode the most recent frame to a photo file
    pub fn take_picture(&self) -> Completion<PathBuf> {
        let inner = &self.inner;
        if !inner.state.get().is_live() {
            return Completion::ready(Err(SessionError::NotRunning));
        }
        let Some(frame) = lock(&inner.latest).clone() else {
            return Completion::ready(Err(SessionError::NoFrame));
        };

        let encoder = Arc::clone(&inner.photo_encoder);
        let path = storage::photo_path(&inner.settings.output_dir, inner.id, encoder.extension());
        let camera_id = inner.id;
        let (tx, completion) = Completion::channel();

        debug!(camera_id, sequence = frame.sequence, path = %path.display(), "Taking picture");
        // An unspawned task drops `tx`, resolving the completion as Disposed
        inner.tasks.spawn(format!("photo-{camera_id}"), move || {
            let result = save_frame(encoder.as_ref(), &frame, &path).map_err(|e| {
                error!(camera_id, error = %e, "Photo capture failed");
                SessionError::CaptureFailed(e)
            });
            let _ = tx.send(result);
        });
        completion
    }

    /// Start recording into a new file in the output directory
    ///
    /// If a previous recording is still finalizing, the new one starts once
    /// that finalize has completed.
    pub fn start_video_recording(&self) -> Completion<()> {
        let inner = &self.inner;
        if !inner.state.get().is_live() {
            return Completion::ready(Err(SessionError::NotRunning));
        }
        if inner.recording.is_active() || inner.pending.contains(OperationKind::StartRecord) {
            return Completion::ready(Err(SessionError::AlreadyRecording));
        }

        let (tx, completion) = Completion::channel();
        if let Err(e) = inner.pending.insert_start_record(tx) {
            return Completion::ready(Err(e));
        }

        let weak = Arc::downgrade(inner);
        let spawned = inner.tasks.spawn(format!("record-start-{}", inner.id), move || {
            if let Some(inner) = weak.upgrade() {
                inner.run_start_recording();
            }
        });
        if !spawned {
            inner.pending.complete_start_record(Err(SessionError::Disposed));
        }
        completion
    }

    /// Stop the recording; resolves with the path once the file is finalized
    pub fn stop_video_recording(&self) -> Completion<PathBuf> {
        let inner = &self.inner;
        if !inner.state.get().is_live() {
            return Completion::ready(Err(SessionError::NotRecording));
        }

        let (tx, completion) = Completion::channel();
        if let Err(e) = inner.pending.insert_stop_record(tx) {
            return Completion::ready(Err(e));
        }
        if let Err(e) = inner.recording.stop() {
            inner.pending.complete_stop_record(Err(e));
        }
        completion
    }

    /// Begin forwarding frames to the stream consumer. Idempotent; ignored
    /// once the session is disposing.
    pub fn start_image_stream(&self) {
        if self.inner.state.get().is_terminal() {
            debug!(camera_id = self.inner.id, "Ignoring stream start on disposed session");
            return;
        }
        self.inner.stream.start();
    }

    /// Stop forwarding frames to the stream consumer. Idempotent.
    pub fn stop_image_stream(&self) {
        self.inner.stream.stop();
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.stream.is_streaming()
    }

    /// Switch stream delivery to the shared block; `doorbell` must not call
    /// back into the session.
    pub fn register_stream_doorbell(&self, doorbell: Doorbell) -> SessionResult<()> {
        if self.inner.state.get().is_terminal() {
            return Err(SessionError::Disposed);
        }
        self.inner.stream.register_doorbell(doorbell);
        Ok(())
    }

    /// Once this returns the doorbell will not be rung again
    pub fn unregister_stream_doorbell(&self) -> bool {
        self.inner.stream.unregister_doorbell()
    }

    pub fn stream_block(&self) -> Option<Arc<SharedFrameBlock>> {
        self.inner.stream.block()
    }

    /// Suspend display delivery; streaming and recording continue
    ///
    /// Idempotent. Outside `Running`/`Paused` there is no display delivery
    /// to suspend and the call does nothing.
    /// Flip every later frame horizontally, or stop flipping
    ///
    /// Applies to the preview, the image stream, recordings and photos alike.
    pub fn set_mirror(&self, mirrored: bool) {
        let previous = self.inner.mirrored.swap(mirrored, Ordering::Relaxed);
        if previous != mirrored {
            info!(camera_id = self.inner.id, mirrored, "Mirror changed");
        }
    }

    pub fn is_mirrored(&self) -> bool {
        self.inner.mirrored.load(Ordering::Relaxed)
    }

    pub fn pause_preview(&self) {
        match self
            .inner
            .state
            .transition(SessionState::Running, SessionState::Paused)
        {
            Ok(()) => info!(camera_id = self.inner.id, "Preview paused"),
            Err(state) => debug!(camera_id = self.inner.id, %state, "Pause ignored"),
        }
    }

    pub fn resume_preview(&self) {
        match self
            .inner
            .state
            .transition(SessionState::Paused, SessionState::Running)
        {
            Ok(()) => info!(camera_id = self.inner.id, "Preview resumed"),
            Err(state) => debug!(camera_id = self.inner.id, %state, "Resume ignored"),
        }
    }

    pub fn recording_state(&self) -> BranchState {
        self.inner.recording.state()
    }

    pub fn recording_stats(&self) -> QueueStats {
        self.inner.recording.stats()
    }

    /// Tear the session down; returns once disposal has completed
    ///
    /// Idempotent. A concurrent second call waits for the first. Must not
    /// be called from a doorbell or any other capture-thread callback.
    pub fn dispose(&self) {
        self.inner.state.claim_disposing();
        self.inner.run_teardown();
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.dispose();
        let reaper = lock(&self.inner.reaper).take();
        if let Some(reaper) = reaper {
            if reaper.join().is_err() {
                warn!(camera_id = self.inner.id, "Session reaper panicked");
            }
        }
    }
}

impl SessionInner {
    fn actual_resolution(&self) -> Option<Resolution> {
        let width = self.actual_width.load(Ordering::Acquire);
        let height = self.actual_height.load(Ordering::Acquire);
        (width > 0 && height > 0).then(|| Resolution::new(width, height))
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!(camera_id = self.id, "Event receiver dropped");
        }
    }

    fn run_initialize(self: &Arc<Self>) {
        let opened = match lock(&self.capture).as_mut() {
            Some(source) => source.open(&self.config),
            None => Err("Capture source was released".to_string()),
        };
        let format = match opened {
            Ok(format) => format,
            Err(e) => {
                error!(camera_id = self.id, error = %e, "Failed to open capture source");
                self.fail_initialization(e);
                return;
            }
        };
        info!(
            camera_id = self.id,
            resolution = %format.resolution,
            fps = format.fps,
            layout = ?format.layout,
            audio = format.audio.is_some(),
            "Capture source opened"
        );
        *lock(&self.negotiated) = Some(format);

        let weak = Arc::downgrade(self);
        match InitWatchdog::arm(self.id, self.settings.init_timeout(), move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_init_timeout();
            }
        }) {
            Ok(watchdog) => *lock(&self.watchdog) = Some(watchdog),
            Err(e) => {
                self.stop_capture();
                self.fail_initialization(format!("Failed to arm init timeout: {e}"));
                return;
            }
        }

        if self.state.get() != SessionState::Initializing {
            debug!(camera_id = self.id, "Initialization abandoned before start");
            return;
        }

        let sink: Arc<dyn FrameSink> = Arc::new(SessionSink {
            inner: Arc::downgrade(self),
        });
        let started = match lock(&self.capture).as_mut() {
            Some(source) => source.start(sink),
            None => Err("Capture source was released".to_string()),
        };
        match started {
            Ok(()) => debug!(camera_id = self.id, "Capture started, waiting for first frame"),
            Err(e) => {
                error!(camera_id = self.id, error = %e, "Failed to start capture source");
                self.stop_capture();
                if let Some(watchdog) = lock(&self.watchdog).take() {
                    watchdog.join();
                }
                self.fail_initialization(e);
            }
        }
    }

    /// Resolve a failed initialization and return to `Created`
    ///
    /// The pending entry is taken before the state changes back so that a
    /// new `initialize` can never collide with the entry being failed.
    fn fail_initialization(&self, reason: String) {
        let Some(tx) = self.pending.take_init() else {
            return;
        };
        if self
            .state
            .transition(SessionState::Initializing, SessionState::Created)
            .is_err()
        {
            let _ = tx.send(Err(SessionError::Disposed));
            return;
        }
        *lock(&self.negotiated) = None;
        let _ = tx.send(Err(SessionError::InitializationFailed(reason)));
    }

    fn stop_capture(&self) {
        if let Some(source) = lock(&self.capture).as_mut() {
            source.stop();
        }
    }

    fn on_init_timeout(self: &Arc<Self>) {
        let Some(tx) = self.pending.take_init() else {
            return;
        };
        warn!(
            camera_id = self.id,
            timeout_ms = self.settings.init_timeout_ms,
            "No frame before initialization timeout"
        );
        self.schedule_teardown();
        let _ = tx.send(Err(SessionError::InitializationTimedOut));
    }

    /// Resolve the pending initialization from the first frame
    ///
    /// Returns false if initialization was already resolved (timeout or
    /// disposal won the race); the frame is then dropped.
    fn complete_first_frame(&self, frame: &CameraFrame) -> bool {
        let Some(tx) = self.pending.take_init() else {
            return false;
        };
        if let Err(found) = self
            .state
            .transition(SessionState::Initializing, SessionState::Running)
        {
            debug!(camera_id = self.id, state = %found, "First frame after initialization ended");
            let _ = tx.send(Err(SessionError::Disposed));
            return false;
        }

        self.actual_width.store(frame.width, Ordering::Release);
        self.actual_height.store(frame.height, Ordering::Release);
        self.first_frame.store(true, Ordering::Release);
        if let Some(watchdog) = lock(&self.watchdog).as_ref() {
            watchdog.cancel();
        }

        let resolution = frame.resolution();
        info!(camera_id = self.id, %resolution, "First frame received, session running");
        let _ = tx.send(Ok(resolution));
        true
    }

    fn handle_frame(&self, raw: RawFrame<'_>) {
        let state = self.state.get();
        if !matches!(
            state,
            SessionState::Initializing | SessionState::Running | SessionState::Paused
        ) {
            return;
        }

        let packed = if self.mirrored.load(Ordering::Relaxed) {
            raw.pack_mirrored()
        } else {
            raw.pack()
        };
        let data = match packed {
            Ok(data) => data,
            Err(e) => {
                warn!(camera_id = self.id, error = %e, "Dropping malformed frame");
                return;
            }
        };
        let layout = lock(&self.negotiated)
            .as_ref()
            .map(|format| format.layout)
            .unwrap_or(PixelLayout::Bgra);
        let sequence = self.frame_sequence.fetch_add(1, Ordering::Relaxed);
        let frame = CameraFrame {
            width: raw.width,
            height: raw.height,
            layout,
            data,
            sequence,
            captured_at: Instant::now(),
        };

        if !self.first_frame.load(Ordering::Acquire) && !self.complete_first_frame(&frame) {
            return;
        }

        match self.state.get() {
            SessionState::Running => {
                self.ring.update(&frame);
                self.registrar.mark_frame_available(self.texture_id);
            }
            SessionState::Paused => {}
            _ => return,
        }
        if sequence % timing::FRAME_LOG_INTERVAL == 0 {
            trace!(camera_id = self.id, sequence, width = frame.width, height = frame.height, "Frame");
        }

        let frame = Arc::new(frame);
        *lock(&self.latest) = Some(Arc::clone(&frame));
        self.stream.push(&frame);
        self.recording.append_frame(&frame);
    }

    fn handle_audio(&self, sample: AudioSample) {
        if self.state.get().is_live() {
            self.recording.append_audio(sample);
        }
    }

    /// Error or unexpected end of stream from the capture source
    fn handle_fault(self: &Arc<Self>, description: String) {
        loop {
            match self.state.get() {
                SessionState::Initializing => {
                    let Some(tx) = self.pending.take_init() else {
                        // Whoever claimed initialization is about to move the
                        // state on; report the fault against that state
                        std::thread::yield_now();
                        continue;
                    };
                    error!(camera_id = self.id, error = %description, "Capture failed during initialization");
                    self.schedule_teardown();
                    let _ = tx.send(Err(SessionError::InitializationFailed(description)));
                }
                SessionState::Running | SessionState::Paused => {
                    error!(camera_id = self.id, error = %description, "Capture failed");
                    self.emit(SessionEvent::CameraError {
                        camera_id: self.id,
                        description: description.clone(),
                    });
                    let start = self.pending.take_start_record();
                    let stop = self.pending.take_stop_record();
                    self.schedule_teardown();
                    if let Some(tx) = start {
                        let _ = tx.send(Err(SessionError::RecordingFailed(description.clone())));
                    }
                    if let Some(tx) = stop {
                        let _ = tx.send(Err(SessionError::RecordingFailed(description)));
                    }
                }
                state => {
                    debug!(camera_id = self.id, %state, error = %description, "Ignoring capture fault");
                }
            }
            return;
        }
    }

    fn run_start_recording(self: &Arc<Self>) {
        if !self.state.get().is_live() {
            self.pending.complete_start_record(Err(SessionError::NotRunning));
            return;
        }
        let (Some(resolution), Some(negotiated)) =
            (self.actual_resolution(), *lock(&self.negotiated))
        else {
            self.pending.complete_start_record(Err(SessionError::NotRunning));
            return;
        };

        let format = RecordingFormat {
            resolution,
            fps: negotiated.fps.max(1),
            layout: negotiated.layout,
            video_bitrate_kbps: self.config.video_bitrate_for(resolution.width),
            audio: negotiated.audio.filter(|_| self.config.enable_audio),
            audio_bitrate_kbps: self.config.audio_bitrate_kbps,
        };
        let writer = (self.writer_factory)();
        let output = storage::video_path(&self.settings.output_dir, self.id, writer.extension());

        let weak = Arc::downgrade(self);
        let on_finished: OnFinished = Box::new(move |outcome| {
            if let Some(inner) = weak.upgrade() {
                inner.on_recording_finished(outcome);
            }
        });
        let result = self.recording.start(format, output, writer, on_finished);
        self.pending.complete_start_record(result);
    }

    fn on_recording_finished(&self, outcome: RecordingOutcome) {
        match outcome {
            RecordingOutcome::Finalized(path) => {
                if !self.pending.complete_stop_record(Ok(path)) {
                    debug!(camera_id = self.id, "Recording finalized with no stop pending");
                }
            }
            RecordingOutcome::Failed(reason) => {
                let error = SessionError::RecordingFailed(reason.clone());
                if !self.pending.complete_stop_record(Err(error)) {
                    self.emit(SessionEvent::CameraError {
                        camera_id: self.id,
                        description: format!("Recording failed: {reason}"),
                    });
                }
            }
            RecordingOutcome::Discarded => {}
        }
    }

    /// Claim disposal and run it on a reaper thread
    ///
    /// Used from capture and watchdog callbacks, which must not join the
    /// threads they run on.
    fn schedule_teardown(self: &Arc<Self>) {
        if !self.state.claim_disposing() {
            return;
        }
        let weak = Arc::downgrade(self);
        let spawned = std::thread::Builder::new()
            .name(format!("session-reaper-{}", self.id))
            .spawn(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.run_teardown();
                }
            });
        match spawned {
            Ok(handle) => *lock(&self.reaper) = Some(handle),
            // The next dispose() call performs the teardown instead
            Err(e) => error!(camera_id = self.id, error = %e, "Failed to spawn session reaper"),
        }
    }

    fn run_teardown(&self) {
        if self.teardown_started.swap(true, Ordering::AcqRel) {
            self.wait_disposed();
            return;
        }
        let camera_id = self.id;
        info!(camera_id, "Disposing camera session");

        self.pending.fail_all(SessionError::Disposed);
        self.tasks.close_and_join();
        let watchdog = lock(&self.watchdog).take();
        if let Some(watchdog) = watchdog {
            watchdog.join();
        }

        self.recording.abort();
        self.stream.shutdown();

        let source = lock(&self.capture).take();
        if let Some(mut source) = source {
            debug!(camera_id, source = source.name(), "Stopping capture source");
            source.stop();
        }

        // The producer thread is joined; nothing writes these any more
        self.stream.release_block();
        self.ring.release();
        *lock(&self.latest) = None;

        self.registrar.unregister(self.texture_id);
        self.emit(SessionEvent::CameraClosing { camera_id });
        self.state.set(SessionState::Disposed);

        let (done, condvar) = &self.disposed;
        *lock(done) = true;
        condvar.notify_all();
        info!(camera_id, "Camera session disposed");
    }

    fn wait_disposed(&self) {
        let (done, condvar) = &self.disposed;
        let guard = lock(done);
        let _guard = condvar
            .wait_while(guard, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Frame sink handed to the capture source
struct SessionSink {
    inner: Weak<SessionInner>,
}

impl FrameSink for SessionSink {
    fn on_frame(&self, frame: RawFrame<'_>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_frame(frame);
        }
    }

    fn on_audio(&self, sample: AudioSample) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_audio(sample);
        }
    }

    fn on_error(&self, description: String) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_fault(description);
        }
    }

    fn on_end_of_stream(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_fault("Camera stream ended unexpectedly".to_string());
        }
    }
}
