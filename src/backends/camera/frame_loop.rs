// SPDX-License-Identifier: GPL-3.0-only
//! Producer thread lifecycle
//!
//! Capture sources that pull frames themselves run their loop on a
//! [`CaptureLoopController`]. Stopping the controller always joins the
//! thread, which is what lets a session free shared buffers afterwards.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// What the loop body wants to happen next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// Owns a named producer thread running a loop body until told to stop
///
/// ```ignore
/// let mut producer = CaptureLoopController::start("synthetic", state, |state, stop| {
///     emit_frame(state);
///     LoopAction::Continue
/// })?;
/// producer.stop(); // joins
/// ```
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoopController {
    /// Spawn the loop thread
    ///
    /// `loop_fn` receives the per-thread state and the stop flag, so bodies
    /// that sleep between frames can cut the wait short.
    pub fn start<S, F>(name: &str, mut state: S, mut loop_fn: F) -> io::Result<Self>
    where
        S: Send + 'static,
        F: FnMut(&mut S, &AtomicBool) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, "Starting producer loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %thread_name, "Producer loop thread started");
                while !thread_stop.load(Ordering::Acquire) {
                    if loop_fn(&mut state, &thread_stop) == LoopAction::Stop {
                        debug!(name = %thread_name, "Loop requested stop");
                        break;
                    }
                }
                info!(name = %thread_name, "Producer loop thread exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the loop without waiting for it
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::Release);
    }

    /// Signal the loop and join its thread
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Join the thread without signalling (for loops that stop themselves)
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Joining producer loop thread");
            if handle.join().is_err() {
                warn!(name = %self.name, "Producer loop thread panicked");
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}
