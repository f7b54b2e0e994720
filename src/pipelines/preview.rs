// SPDX-License-Identifier: GPL-3.0-only

//! Triple-buffered handoff from the producer thread to the display consumer
//!
//! Three slots rotate through the roles `write` (producer only), `ready`
//! (latest complete frame) and `read` (exposed to the consumer). The role
//! table is guarded by a short-held lock; the bulk copy into the write slot
//! happens outside it, so neither side ever waits for the other's copy.
//!
//! Each slot carries its own dimensions. On a size change the producer only
//! reallocates the slot it exclusively owns; the remaining slots are resized
//! as they rotate into the write role, and a consumer always sees a slot's
//! pixels and dimensions together.

use crate::backends::camera::types::CameraFrame;
use crate::sync::lock;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct Slot {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    sequence: u64,
}

#[derive(Debug)]
struct Roles {
    write: usize,
    ready: usize,
    read: usize,
    has_new_frame: bool,
}

/// Latest-wins frame handoff for one display consumer
#[derive(Debug)]
pub struct FrameSlotRing {
    slots: [Mutex<Slot>; 3],
    roles: Mutex<Roles>,
}

/// The consumer's view of the `read` slot
///
/// Holds the slot until dropped; drop it before the next
/// [`obtain`](FrameSlotRing::obtain).
pub struct FrameView<'a> {
    slot: MutexGuard<'a, Slot>,
    index: usize,
}

impl FrameView<'_> {
    pub fn pixels(&self) -> &[u8] {
        &self.slot.pixels
    }

    pub fn width(&self) -> u32 {
        self.slot.width
    }

    pub fn height(&self) -> u32 {
        self.slot.height
    }

    /// Sequence number of the frame copied into this slot
    pub fn sequence(&self) -> u64 {
        self.slot.sequence
    }

    /// Slot index, for checking role invariants
    pub fn slot_index(&self) -> usize {
        self.index
    }
}

impl FrameSlotRing {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
            roles: Mutex::new(Roles {
                write: 0,
                ready: 1,
                read: 2,
                has_new_frame: false,
            }),
        }
    }

    /// Publish a frame. Producer thread only.
    pub fn update(&self, frame: &CameraFrame) {
        let write = lock(&self.roles).write;

        {
            let mut slot = lock(&self.slots[write]);
            if slot.width != frame.width || slot.height != frame.height {
                debug!(
                    slot = write,
                    width = frame.width,
                    height = frame.height,
                    "Reallocating preview slot"
                );
                slot.pixels.clear();
                slot.pixels.resize(frame.data.len(), 0);
                slot.width = frame.width;
                slot.height = frame.height;
            }
            slot.pixels.copy_from_slice(&frame.data);
            slot.sequence = frame.sequence;
        }

        let mut roles = lock(&self.roles);
        let Roles { write, ready, .. } = &mut *roles;
        std::mem::swap(write, ready);
        roles.has_new_frame = true;
        trace!(sequence = frame.sequence, "Preview frame published");
    }

    /// Expose the newest complete frame. Consumer thread only.
    ///
    /// Returns `None` until the first frame has been published.
    pub fn obtain(&self) -> Option<FrameView<'_>> {
        let read = {
            let mut roles = lock(&self.roles);
            if roles.has_new_frame {
                let Roles { ready, read, .. } = &mut *roles;
                std::mem::swap(ready, read);
                roles.has_new_frame = false;
            }
            roles.read
        };

        let slot = lock(&self.slots[read]);
        if slot.width == 0 || slot.height == 0 {
            return None;
        }
        Some(FrameView { slot, index: read })
    }

    /// Whether a frame newer than the last obtained one is waiting
    pub fn has_new_frame(&self) -> bool {
        lock(&self.roles).has_new_frame
    }

    /// Current `(write, ready, read)` slot indices
    pub fn roles(&self) -> (usize, usize, usize) {
        let roles = lock(&self.roles);
        (roles.write, roles.ready, roles.read)
    }

    /// Free all slot memory. Only called once the producer is joined.
    pub fn release(&self) {
        for slot in &self.slots {
            *lock(slot) = Slot::default();
        }
        lock(&self.roles).has_new_frame = false;
        debug!("Preview slots released");
    }
}

impl Default for FrameSlotRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelLayout;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    fn frame(width: u32, height: u32, fill: u8, sequence: u64) -> CameraFrame {
        CameraFrame {
            width,
            height,
            layout: PixelLayout::Bgra,
            data: Arc::from(vec![fill; (width * height * 4) as usize]),
            sequence,
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn test_no_frame_before_first_update() {
        let ring = FrameSlotRing::new();
        assert!(ring.obtain().is_none());
    }

    #[test]
    fn test_latest_frame_wins() {
        let ring = FrameSlotRing::new();
        ring.update(&frame(4, 2, 1, 0));
        ring.update(&frame(4, 2, 2, 1));
        ring.update(&frame(4, 2, 3, 2));

        let view = ring.obtain().unwrap();
        assert_eq!(view.sequence(), 2);
        assert!(view.pixels().iter().all(|&b| b == 3));
        drop(view);

        // Nothing new: the same frame is exposed again
        assert!(!ring.has_new_frame());
        assert_eq!(ring.obtain().unwrap().sequence(), 2);
    }

    #[test]
    fn test_update_hands_write_slot_to_ready() {
        let ring = FrameSlotRing::new();
        assert_eq!(ring.roles(), (0, 1, 2));
        ring.update(&frame(2, 2, 4, 0));
        assert_eq!(ring.roles(), (1, 0, 2));
        assert!(ring.has_new_frame());

        let view = ring.obtain().unwrap();
        assert_eq!(view.slot_index(), 0);
        drop(view);
        assert_eq!(ring.roles(), (1, 2, 0));
        assert!(!ring.has_new_frame());
    }

    #[test]
    fn test_roles_stay_a_permutation() {
        let ring = FrameSlotRing::new();
        for i in 0..10u64 {
            ring.update(&frame(2, 2, i as u8, i));
            if i % 3 == 0 {
                drop(ring.obtain());
            }
            let (w, r, d) = ring.roles();
            let mut all = [w, r, d];
            all.sort_unstable();
            assert_eq!(all, [0, 1, 2]);
        }
    }

    #[test]
    fn test_dimension_change_keeps_slot_consistent() {
        let ring = FrameSlotRing::new();
        ring.update(&frame(4, 4, 1, 0));
        drop(ring.obtain());
        ring.update(&frame(8, 2, 2, 1));

        let view = ring.obtain().unwrap();
        assert_eq!((view.width(), view.height()), (8, 2));
        assert_eq!(view.pixels().len(), 64);
    }

    #[test]
    fn test_release_clears_frames() {
        let ring = FrameSlotRing::new();
        ring.update(&frame(2, 2, 9, 0));
        ring.release();
        assert!(ring.obtain().is_none());
    }

    #[test]
    fn test_concurrent_reader_never_sees_partial_or_write_slot() {
        let ring = Arc::new(FrameSlotRing::new());
        let done = Arc::new(AtomicBool::new(false));

        let producer = {
            let ring = Arc::clone(&ring);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                for i in 0..2000u64 {
                    // Alternate sizes to exercise reallocation
                    let (w, h) = if i % 50 < 25 { (16, 8) } else { (8, 8) };
                    ring.update(&frame(w, h, (i % 251) as u8, i));
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let mut last_sequence = 0;
        while !done.load(Ordering::SeqCst) {
            if let Some(view) = ring.obtain() {
                let (write, _, _) = ring.roles();
                assert_ne!(view.slot_index(), write);
                assert_eq!(
                    view.pixels().len(),
                    (view.width() * view.height() * 4) as usize
                );
                let first = view.pixels()[0];
                assert!(view.pixels().iter().all(|&b| b == first));
                assert_eq!(first, (view.sequence() % 251) as u8);
                assert!(view.sequence() >= last_sequence);
                last_sequence = view.sequence();
            }
        }
        producer.join().unwrap();
    }
}
