// SPDX-License-Identifier: GPL-3.0-only

//! Recording branch: gate, bounded queue and background writer
//!
//! ```text
//! producer ──▶ RecordQueue (gate + caps) ──▶ writer thread ──▶ MediaWriter
//!                                                  │
//!                               EndOfStream ──▶ finalize ──▶ on_finished
//! ```
//!
//! `start` and `stop` are serialized: `start` holds the lifecycle lock and
//! joins the previous writer thread before configuring a new writer, so a
//! new recording never overlaps the finalize of the previous one.

use super::queue::{Offer, QueueLimits, QueueStats, RecordItem, RecordQueue};
use super::writer::{MediaWriter, RecordingFormat};
use crate::backends::camera::types::{AudioSample, CameraFrame};
use crate::errors::{SessionError, SessionResult};
use crate::sync::lock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Sub-state of a session's recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    NotStarted,
    Starting,
    Running,
    Stopping,
}

/// How a recording ended; reported exactly once per started recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// The container was finalized at this path
    Finalized(PathBuf),
    /// Writing or finalizing failed; partial output was discarded
    Failed(String),
    /// The branch was aborted before end-of-stream
    Discarded,
}

/// Callback run on the writer thread when a recording ends
pub type OnFinished = Box<dyn FnOnce(RecordingOutcome) + Send>;

pub struct RecordingBranch {
    camera_id: i64,
    queue: Arc<RecordQueue>,
    state: Arc<Mutex<BranchState>>,
    lifecycle: Mutex<Option<JoinHandle<()>>>,
    output: Mutex<Option<PathBuf>>,
    dropped_frames: AtomicU64,
}

impl RecordingBranch {
    pub fn new(camera_id: i64, limits: QueueLimits) -> Self {
        Self {
            camera_id,
            queue: Arc::new(RecordQueue::new(limits)),
            state: Arc::new(Mutex::new(BranchState::NotStarted)),
            lifecycle: Mutex::new(None),
            output: Mutex::new(None),
            dropped_frames: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> BranchState {
        *lock(&self.state)
    }

    /// Starting or running (a stopping recording is no longer active)
    pub fn is_active(&self) -> bool {
        matches!(self.state(), BranchState::Starting | BranchState::Running)
    }

    /// Output of the current or most recent recording
    pub fn output_path(&self) -> Option<PathBuf> {
        lock(&self.output).clone()
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Configure `writer` for `output` and open the gate
    ///
    /// Blocks until any previous recording has finished finalizing; call it
    /// off the control thread. `on_finished` runs once on the writer thread.
    pub fn start(
        &self,
        format: RecordingFormat,
        output: PathBuf,
        mut writer: Box<dyn MediaWriter>,
        on_finished: OnFinished,
    ) -> SessionResult<()> {
        let mut writer_thread = lock(&self.lifecycle);

        if self.is_active() {
            return Err(SessionError::AlreadyRecording);
        }
        if let Some(previous) = writer_thread.take() {
            debug!(camera_id = self.camera_id, "Waiting for previous recording to finalize");
            if previous.join().is_err() {
                warn!(camera_id = self.camera_id, "Previous recording writer panicked");
            }
        }

        {
            let mut state = lock(&self.state);
            if *state != BranchState::NotStarted {
                return Err(SessionError::AlreadyRecording);
            }
            *state = BranchState::Starting;
        }

        if let Err(e) = writer.configure(&format, &output) {
            error!(camera_id = self.camera_id, error = %e, "Failed to configure recording writer");
            *lock(&self.state) = BranchState::NotStarted;
            return Err(SessionError::RecordingSetupFailed(e));
        }

        self.dropped_frames.store(0, Ordering::Relaxed);
        self.queue.open(format.resolution, frame_duration(format.fps));

        let camera_id = self.camera_id;
        let queue = Arc::clone(&self.queue);
        let state = Arc::clone(&self.state);
        let spawned = std::thread::Builder::new()
            .name(format!("record-writer-{camera_id}"))
            .spawn(move || run_writer(camera_id, &queue, &state, writer, on_finished));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // The closure, writer included, was dropped with the error
                self.queue.abort();
                *lock(&self.state) = BranchState::NotStarted;
                return Err(SessionError::RecordingSetupFailed(format!(
                    "Failed to spawn writer thread: {e}"
                )));
            }
        };

        *lock(&self.state) = BranchState::Running;
        *writer_thread = Some(handle);
        *lock(&self.output) = Some(output.clone());
        info!(
            camera_id,
            path = %output.display(),
            resolution = %format.resolution,
            fps = format.fps,
            "Recording started"
        );
        Ok(())
    }

    /// Close the gate behind an end-of-stream marker
    ///
    /// Returns immediately; the outcome arrives through `on_finished` once the
    /// writer has drained the queue and finalized the file.
    pub fn stop(&self) -> SessionResult<()> {
        let mut state = lock(&self.state);
        if *state != BranchState::Running {
            return Err(SessionError::NotRecording);
        }
        *state = BranchState::Stopping;
        self.queue.close();
        info!(camera_id = self.camera_id, "Recording stopping");
        Ok(())
    }

    /// Forced shutdown: a running recording is discarded, a stopping one is
    /// allowed to finish finalizing. Joins the writer thread.
    pub fn abort(&self) {
        let mut writer_thread = lock(&self.lifecycle);
        {
            let state = lock(&self.state);
            if matches!(*state, BranchState::Starting | BranchState::Running) {
                debug!(camera_id = self.camera_id, "Aborting recording");
                self.queue.abort();
            }
        }
        if let Some(handle) = writer_thread.take() {
            if handle.join().is_err() {
                warn!(camera_id = self.camera_id, "Recording writer panicked");
            }
        }
    }

    /// Offer a frame to the recording. Producer thread only.
    pub fn append_frame(&self, frame: &CameraFrame) -> Offer {
        let offer = self.queue.push_video(frame);
        if offer == Offer::Dropped {
            let dropped = self.dropped_frames.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % 30 == 0 {
                warn!(camera_id = self.camera_id, dropped, "Recording queue full, dropping frames");
            }
        }
        offer
    }

    /// Offer an audio sample to the recording
    pub fn append_audio(&self, sample: AudioSample) -> Offer {
        self.queue.push_audio(sample)
    }
}

impl Drop for RecordingBranch {
    fn drop(&mut self) {
        self.abort();
    }
}

fn frame_duration(fps: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1)))
}

fn run_writer(
    camera_id: i64,
    queue: &RecordQueue,
    state: &Mutex<BranchState>,
    mut writer: Box<dyn MediaWriter>,
    on_finished: OnFinished,
) {
    debug!(camera_id, "Recording writer started");
    let mut written: u64 = 0;

    let outcome = loop {
        let result = match queue.next() {
            Some(RecordItem::Video { pixels, timestamp }) => {
                written += 1;
                writer.write_video_frame(&pixels, timestamp)
            }
            Some(RecordItem::Audio { sample, timestamp }) => {
                writer.write_audio_sample(&sample, timestamp)
            }
            Some(RecordItem::EndOfStream) => {
                break match writer.finalize() {
                    Ok(path) => RecordingOutcome::Finalized(path),
                    Err(e) => {
                        writer.discard();
                        RecordingOutcome::Failed(e)
                    }
                };
            }
            None => {
                writer.discard();
                break RecordingOutcome::Discarded;
            }
        };
        if let Err(e) = result {
            queue.abort();
            writer.discard();
            break RecordingOutcome::Failed(e);
        }
    };

    match &outcome {
        RecordingOutcome::Finalized(path) => {
            info!(camera_id, frames = written, path = %path.display(), "Recording finalized")
        }
        RecordingOutcome::Failed(e) => error!(camera_id, error = %e, "Recording failed"),
        RecordingOutcome::Discarded => info!(camera_id, "Recording discarded"),
    }

    *lock(state) = BranchState::NotStarted;
    on_finished(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{PixelLayout, Resolution};
    use std::path::Path;
    use std::sync::mpsc;
    use std::time::Instant;

    /// Writer that records calls and can be slowed down or made to fail
    #[derive(Clone, Default)]
    struct LoggingWriter {
        log: Arc<Mutex<Vec<String>>>,
        finalize_delay: Duration,
        fail_configure: bool,
    }

    impl MediaWriter for LoggingWriter {
        fn extension(&self) -> &'static str {
            "log"
        }
        fn configure(&mut self, _format: &RecordingFormat, output: &Path) -> Result<(), String> {
            if self.fail_configure {
                return Err("no encoder".to_string());
            }
            self.log.lock().unwrap().push(format!("configure {}", output.display()));
            Ok(())
        }
        fn write_video_frame(&mut self, _pixels: &[u8], ts: Duration) -> Result<(), String> {
            self.log.lock().unwrap().push(format!("video {}", ts.as_millis()));
            Ok(())
        }
        fn write_audio_sample(&mut self, _s: &AudioSample, _ts: Duration) -> Result<(), String> {
            Ok(())
        }
        fn finalize(&mut self) -> Result<PathBuf, String> {
            std::thread::sleep(self.finalize_delay);
            self.log.lock().unwrap().push("finalize".to_string());
            Ok(PathBuf::from("/tmp/take.out"))
        }
        fn discard(&mut self) {
            self.log.lock().unwrap().push("discard".to_string());
        }
    }

    fn format() -> RecordingFormat {
        RecordingFormat {
            resolution: Resolution::new(2, 2),
            fps: 25,
            layout: PixelLayout::Bgra,
            video_bitrate_kbps: 1000,
            audio: None,
            audio_bitrate_kbps: 128,
        }
    }

    fn limits() -> QueueLimits {
        QueueLimits {
            max_video_frames: 8,
            max_audio_samples: 8,
            max_bytes: usize::MAX,
        }
    }

    fn frame() -> CameraFrame {
        CameraFrame {
            width: 2,
            height: 2,
            layout: PixelLayout::Bgra,
            data: Arc::from(vec![0u8; 16]),
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    fn outcome_channel() -> (OnFinished, mpsc::Receiver<RecordingOutcome>) {
        let (tx, rx) = mpsc::channel();
        (
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
            rx,
        )
    }

    #[test]
    fn test_stop_finalizes_after_accepted_frames() {
        let branch = RecordingBranch::new(1, limits());
        let writer = LoggingWriter::default();
        let log = Arc::clone(&writer.log);
        let (on_finished, rx) = outcome_channel();

        branch
            .start(format(), PathBuf::from("/tmp/a.log"), Box::new(writer), on_finished)
            .unwrap();
        assert_eq!(branch.state(), BranchState::Running);
        for _ in 0..3 {
            assert_eq!(branch.append_frame(&frame()), Offer::Accepted);
        }
        branch.stop().unwrap();
        assert_eq!(branch.append_frame(&frame()), Offer::Closed);
        assert_eq!(branch.stop(), Err(SessionError::NotRecording));

        let outcome = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(outcome, RecordingOutcome::Finalized(PathBuf::from("/tmp/take.out")));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["configure /tmp/a.log", "video 0", "video 40", "video 80", "finalize"]
        );
    }

    #[test]
    fn test_configure_failure_reports_setup_error() {
        let branch = RecordingBranch::new(1, limits());
        let writer = LoggingWriter {
            fail_configure: true,
            ..Default::default()
        };
        let (on_finished, _rx) = outcome_channel();
        let result = branch.start(format(), PathBuf::from("/tmp/b"), Box::new(writer), on_finished);
        assert!(matches!(result, Err(SessionError::RecordingSetupFailed(_))));
        assert_eq!(branch.state(), BranchState::NotStarted);
    }

    #[test]
    fn test_second_start_rejected_while_running() {
        let branch = RecordingBranch::new(1, limits());
        let (first, _rx1) = outcome_channel();
        let (second, _rx2) = outcome_channel();
        branch
            .start(format(), PathBuf::from("/tmp/c"), Box::new(LoggingWriter::default()), first)
            .unwrap();
        assert_eq!(
            branch.start(format(), PathBuf::from("/tmp/d"), Box::new(LoggingWriter::default()), second),
            Err(SessionError::AlreadyRecording)
        );
    }

    #[test]
    fn test_restart_waits_for_previous_finalize() {
        let branch = RecordingBranch::new(1, limits());
        let slow = LoggingWriter {
            finalize_delay: Duration::from_millis(150),
            ..Default::default()
        };
        let shared_log = Arc::clone(&slow.log);
        let (first, rx1) = outcome_channel();
        branch
            .start(format(), PathBuf::from("/tmp/e"), Box::new(slow), first)
            .unwrap();
        branch.stop().unwrap();

        // Second writer shares the log so ordering is observable
        let next = LoggingWriter {
            log: Arc::clone(&shared_log),
            ..Default::default()
        };
        let (second, _rx2) = outcome_channel();
        branch
            .start(format(), PathBuf::from("/tmp/f"), Box::new(next), second)
            .unwrap();

        // By the time start returned, the first recording had finalized
        assert!(rx1.try_recv().is_ok());
        let log = shared_log.lock().unwrap().clone();
        let finalize = log.iter().position(|l| l == "finalize").unwrap();
        let configure = log.iter().position(|l| l == "configure /tmp/f").unwrap();
        assert!(finalize < configure);
    }

    #[test]
    fn test_abort_discards_running_recording() {
        let branch = RecordingBranch::new(1, limits());
        let (on_finished, rx) = outcome_channel();
        branch
            .start(format(), PathBuf::from("/tmp/g"), Box::new(LoggingWriter::default()), on_finished)
            .unwrap();
        branch.append_frame(&frame());
        branch.abort();
        assert_eq!(rx.try_recv().unwrap(), RecordingOutcome::Discarded);
        assert_eq!(branch.state(), BranchState::NotStarted);
    }
}
