// SPDX-License-Identifier: GPL-3.0-only

//! Queued-message delivery of stream frames
//!
//! The producer hands each frame to a worker thread through a single
//! latest-wins slot; the worker copies it and posts an
//! [`ImageStreamFrame`](crate::session::SessionEvent::ImageStreamFrame) to the
//! control thread. A slow control thread therefore costs dropped stream
//! frames, never producer stalls or unbounded memory.

use super::shared_block::StreamMetadata;
use crate::backends::camera::types::CameraFrame;
use crate::session::events::{EventSender, SessionEvent};
use crate::sync::lock;
use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, trace, warn};

#[derive(Default)]
struct DeliveryState {
    pending: Option<(CameraFrame, i64)>,
    stop: bool,
    dropped: u64,
}

#[derive(Default)]
struct DeliveryShared {
    state: Mutex<DeliveryState>,
    wake: Condvar,
}

pub(crate) struct DeliveryWorker {
    shared: Arc<DeliveryShared>,
    thread: Option<JoinHandle<()>>,
}

impl DeliveryWorker {
    pub(crate) fn spawn(camera_id: i64, events: EventSender) -> io::Result<Self> {
        let shared = Arc::new(DeliveryShared::default());
        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name(format!("stream-delivery-{camera_id}"))
            .spawn(move || deliver_loop(camera_id, &worker_shared, &events))?;
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Hand a frame to the worker, replacing any frame not yet delivered
    pub(crate) fn post(&self, frame: &CameraFrame, sequence: i64) {
        let mut state = lock(&self.shared.state);
        if state.stop {
            return;
        }
        if state.pending.replace((frame.clone(), sequence)).is_some() {
            state.dropped += 1;
        }
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Stop the worker and join it; an undelivered frame is dropped
    pub(crate) fn stop(&mut self) {
        {
            let mut state = lock(&self.shared.state);
            state.stop = true;
            state.pending = None;
        }
        self.shared.wake.notify_all();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Stream delivery thread panicked");
            }
        }
    }
}

impl Drop for DeliveryWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn deliver_loop(camera_id: i64, shared: &DeliveryShared, events: &EventSender) {
    debug!(camera_id, "Stream delivery thread started");
    loop {
        let (frame, sequence) = {
            let guard = lock(&shared.state);
            let mut state = shared
                .wake
                .wait_while(guard, |s| s.pending.is_none() && !s.stop)
                .unwrap_or_else(PoisonError::into_inner);
            if state.stop {
                break;
            }
            match state.pending.take() {
                Some(item) => item,
                None => continue,
            }
        };

        let metadata = StreamMetadata {
            sequence,
            width: frame.width,
            height: frame.height,
            bytes_per_row: frame.bytes_per_row(),
            format: frame.layout,
        };
        let event = SessionEvent::ImageStreamFrame {
            camera_id,
            metadata,
            bytes: frame.data.to_vec(),
        };
        if events.send(event).is_err() {
            trace!(camera_id, "Event receiver gone, stream frame discarded");
        }
    }
    let dropped = lock(&shared.state).dropped;
    debug!(camera_id, dropped, "Stream delivery thread exiting");
}
