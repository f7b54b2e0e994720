// SPDX-License-Identifier: GPL-3.0-only

//! Bounded work queue between the producer thread and the recording writer
//!
//! The queue doubles as the recording gate: it starts closed (dropping
//! everything), [`open`](RecordQueue::open) starts accepting, and
//! [`close`](RecordQueue::close) appends the end-of-stream marker and shuts
//! the gate under the same lock, so every accepted item precedes the marker.
//!
//! Video timestamps are `accepted_frames * frame_duration`; the counter only
//! advances when a frame is actually enqueued, so drops never leave gaps.
//! Audio timestamps are re-anchored to the instant the gate opened.

use crate::backends::camera::types::{AudioSample, CameraFrame, Resolution};
use crate::sync::lock;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Caps on queued work; whichever is reached first causes drops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    pub max_video_frames: usize,
    pub max_audio_samples: usize,
    pub max_bytes: usize,
}

/// A unit of work for the writer thread
#[derive(Debug, Clone)]
pub enum RecordItem {
    Video {
        pixels: Arc<[u8]>,
        timestamp: Duration,
    },
    Audio {
        sample: AudioSample,
        timestamp: Duration,
    },
    EndOfStream,
}

impl RecordItem {
    fn byte_len(&self) -> usize {
        match self {
            RecordItem::Video { pixels, .. } => pixels.len(),
            RecordItem::Audio { sample, .. } => sample.data.len(),
            RecordItem::EndOfStream => 0,
        }
    }
}

/// Result of offering an item to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// The queue is full; the item was discarded
    Dropped,
    /// The gate is closed
    Closed,
}

/// Counters for one recording
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub accepted_video: u64,
    pub dropped_video: u64,
    pub accepted_audio: u64,
    pub dropped_audio: u64,
    pub queued_video: usize,
    pub queued_audio: usize,
    pub queued_bytes: usize,
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<RecordItem>,
    accepting: bool,
    aborted: bool,
    resolution: Resolution,
    frame_duration: Duration,
    started_at: Instant,
    last_audio_timestamp: Duration,
    stats: QueueStats,
}

#[derive(Debug)]
pub struct RecordQueue {
    limits: QueueLimits,
    state: Mutex<QueueState>,
    available: Condvar,
}

impl RecordQueue {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                accepting: false,
                aborted: false,
                resolution: Resolution::new(0, 0),
                frame_duration: Duration::ZERO,
                started_at: Instant::now(),
                last_audio_timestamp: Duration::ZERO,
                stats: QueueStats::default(),
            }),
            available: Condvar::new(),
        }
    }

    /// Reset for a new recording and start accepting frames of `resolution`
    pub fn open(&self, resolution: Resolution, frame_duration: Duration) {
        let mut state = lock(&self.state);
        state.items.clear();
        state.accepting = true;
        state.aborted = false;
        state.resolution = resolution;
        state.frame_duration = frame_duration;
        state.started_at = Instant::now();
        state.last_audio_timestamp = Duration::ZERO;
        state.stats = QueueStats::default();
    }

    /// Offer a video frame. Never blocks beyond the queue lock.
    pub fn push_video(&self, frame: &CameraFrame) -> Offer {
        let mut state = lock(&self.state);
        if !state.accepting {
            return Offer::Closed;
        }
        if frame.resolution() != state.resolution
            || state.stats.queued_video >= self.limits.max_video_frames
            || state.stats.queued_bytes + frame.data.len() > self.limits.max_bytes
        {
            state.stats.dropped_video += 1;
            return Offer::Dropped;
        }

        let timestamp = video_timestamp(state.frame_duration, state.stats.accepted_video);
        state.stats.accepted_video += 1;
        self.enqueue(
            &mut state,
            RecordItem::Video {
                pixels: Arc::clone(&frame.data),
                timestamp,
            },
        );
        Offer::Accepted
    }

    /// Offer an audio sample, stamped relative to the recording start
    pub fn push_audio(&self, sample: AudioSample) -> Offer {
        let mut state = lock(&self.state);
        if !state.accepting {
            return Offer::Closed;
        }
        if state.stats.queued_audio >= self.limits.max_audio_samples
            || state.stats.queued_bytes + sample.data.len() > self.limits.max_bytes
        {
            state.stats.dropped_audio += 1;
            return Offer::Dropped;
        }

        let timestamp = sample
            .captured_at
            .saturating_duration_since(state.started_at)
            .max(state.last_audio_timestamp);
        state.last_audio_timestamp = timestamp;
        state.stats.accepted_audio += 1;
        self.enqueue(&mut state, RecordItem::Audio { sample, timestamp });
        Offer::Accepted
    }

    /// Append the end-of-stream marker, then close the gate
    ///
    /// Returns false if the gate was already closed.
    pub fn close(&self) -> bool {
        let mut state = lock(&self.state);
        if !state.accepting {
            return false;
        }
        state.items.push_back(RecordItem::EndOfStream);
        state.accepting = false;
        drop(state);
        self.available.notify_all();
        true
    }

    /// Close the gate and discard everything queued; the writer's next
    /// [`next`](Self::next) returns `None`.
    pub fn abort(&self) {
        let mut state = lock(&self.state);
        state.accepting = false;
        state.aborted = true;
        state.items.clear();
        state.stats.queued_video = 0;
        state.stats.queued_audio = 0;
        state.stats.queued_bytes = 0;
        drop(state);
        self.available.notify_all();
    }

    /// Wait for the next item. `None` once the queue is aborted.
    pub fn next(&self) -> Option<RecordItem> {
        let guard = lock(&self.state);
        let mut state = self
            .available
            .wait_while(guard, |s| s.items.is_empty() && !s.aborted)
            .unwrap_or_else(PoisonError::into_inner);
        if state.aborted {
            return None;
        }
        let item = state.items.pop_front()?;
        match &item {
            RecordItem::Video { .. } => state.stats.queued_video -= 1,
            RecordItem::Audio { .. } => state.stats.queued_audio -= 1,
            RecordItem::EndOfStream => {}
        }
        state.stats.queued_bytes -= item.byte_len();
        Some(item)
    }

    pub fn is_accepting(&self) -> bool {
        lock(&self.state).accepting
    }

    pub fn stats(&self) -> QueueStats {
        lock(&self.state).stats
    }

    fn enqueue(&self, state: &mut QueueState, item: RecordItem) {
        match &item {
            RecordItem::Video { .. } => state.stats.queued_video += 1,
            RecordItem::Audio { .. } => state.stats.queued_audio += 1,
            RecordItem::EndOfStream => {}
        }
        state.stats.queued_bytes += item.byte_len();
        state.items.push_back(item);
        self.available.notify_one();
    }
}

/// Presentation time of the `index`-th accepted frame
fn video_timestamp(frame_duration: Duration, index: u64) -> Duration {
    let frame_ns = u64::try_from(frame_duration.as_nanos()).unwrap_or(u64::MAX);
    Duration::from_nanos(frame_ns.saturating_mul(index))
}
