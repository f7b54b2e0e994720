// SPDX-License-Identifier: GPL-3.0-only

//! Raw frame delivery to an external stream consumer
//!
//! Two delivery modes, chosen per frame:
//!
//! - **Shared block + doorbell** while a doorbell is registered: the frame is
//!   written into a [`SharedFrameBlock`] sized to the largest frame seen so
//!   far, then the doorbell is rung with the camera id.
//! - **Queued messages** otherwise: the frame goes to a delivery thread that
//!   posts a copy to the control thread as a session event.
//!
//! The doorbell slot lock is held while the block is written and the
//! doorbell rung, so once [`StreamChannel::unregister_doorbell`] returns the
//! producer neither writes the block nor rings again. A doorbell must not
//! call back into the channel.

pub mod delivery;
pub mod shared_block;

pub use shared_block::{SharedFrameBlock, StreamFrame, StreamMetadata};

use crate::backends::camera::types::CameraFrame;
use crate::session::events::EventSender;
use crate::sync::lock;
use delivery::DeliveryWorker;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Notification invoked on the producer thread with the camera id
pub type Doorbell = Arc<dyn Fn(i64) + Send + Sync>;

pub struct StreamChannel {
    camera_id: i64,
    events: EventSender,
    streaming: AtomicBool,
    sequence: AtomicI64,
    doorbell: Mutex<Option<Doorbell>>,
    block: Mutex<Option<Arc<SharedFrameBlock>>>,
    delivery: Mutex<Option<DeliveryWorker>>,
}

impl StreamChannel {
    pub fn new(camera_id: i64, events: EventSender) -> Self {
        Self {
            camera_id,
            events,
            streaming: AtomicBool::new(false),
            sequence: AtomicI64::new(0),
            doorbell: Mutex::new(None),
            block: Mutex::new(None),
            delivery: Mutex::new(None),
        }
    }

    /// Begin forwarding frames. Idempotent.
    pub fn start(&self) {
        {
            let mut delivery = lock(&self.delivery);
            if delivery.is_none() {
                match DeliveryWorker::spawn(self.camera_id, self.events.clone()) {
                    Ok(worker) => *delivery = Some(worker),
                    // Doorbell mode still works without the worker
                    Err(e) => warn!(camera_id = self.camera_id, error = %e, "Failed to spawn stream delivery thread"),
                }
            }
        }
        if !self.streaming.swap(true, Ordering::AcqRel) {
            info!(camera_id = self.camera_id, "Image stream started");
        }
    }

    /// Stop forwarding frames. Idempotent; a frame in flight is dropped.
    pub fn stop(&self) {
        if self.streaming.swap(false, Ordering::AcqRel) {
            info!(camera_id = self.camera_id, "Image stream stopped");
        }
        let worker = lock(&self.delivery).take();
        if let Some(mut worker) = worker {
            worker.stop();
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Switch to shared-block mode, replacing any previous doorbell
    pub fn register_doorbell(&self, doorbell: Doorbell) {
        *lock(&self.doorbell) = Some(doorbell);
        debug!(camera_id = self.camera_id, "Stream doorbell registered");
    }

    /// Returns whether a doorbell was registered
    pub fn unregister_doorbell(&self) -> bool {
        let removed = lock(&self.doorbell).take().is_some();
        if removed {
            debug!(camera_id = self.camera_id, "Stream doorbell unregistered");
        }
        removed
    }

    /// The current shared block, if shared-block mode has published a frame
    pub fn block(&self) -> Option<Arc<SharedFrameBlock>> {
        lock(&self.block).clone()
    }

    /// Forward a frame. Producer thread only.
    pub(crate) fn push(&self, frame: &CameraFrame) {
        if !self.streaming.load(Ordering::Acquire) {
            return;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        let doorbell = lock(&self.doorbell);
        if let Some(ring) = doorbell.as_ref() {
            let block = self.block_for(frame.data.len());
            block.publish(frame, sequence);
            ring(self.camera_id);
            return;
        }
        drop(doorbell);

        if let Some(worker) = lock(&self.delivery).as_ref() {
            worker.post(frame, sequence);
        }
    }

    /// Stop streaming and detach the doorbell. The block itself stays until
    /// [`release_block`](Self::release_block), after the producer is joined.
    pub(crate) fn shutdown(&self) {
        self.unregister_doorbell();
        self.stop();
    }

    pub(crate) fn release_block(&self) {
        if lock(&self.block).take().is_some() {
            debug!(camera_id = self.camera_id, "Stream block released");
        }
    }

    /// Grow-only: a smaller frame reuses the existing block
    fn block_for(&self, len: usize) -> Arc<SharedFrameBlock> {
        let mut block = lock(&self.block);
        match block.as_ref() {
            Some(existing) if existing.capacity() >= len => Arc::clone(existing),
            _ => {
                debug!(camera_id = self.camera_id, bytes = len, "Allocating stream block");
                let grown = Arc::new(SharedFrameBlock::with_capacity(len));
                *block = Some(Arc::clone(&grown));
                grown
            }
        }
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
