// SPDX-License-Identifier: GPL-3.0-only

//! Shared frame block read by an external stream consumer
//!
//! Layout mirrors what a foreign reader maps: a header of `sequence`,
//! `width`, `height`, `bytes_per_row`, `format` and `ready`, followed by the
//! pixels. Pixels are stored as 32-bit atomic words so the block can be read
//! while the producer writes it.
//!
//! Writer protocol: `ready = 0`, release fence, data and metadata, release
//! fence, `ready = 1`. A reader that observes `ready == 1` with an acquire
//! load also observes the complete frame. In-process readers go through
//! [`SharedFrameBlock::read_frame`], which pairs the flag with a generation
//! counter (odd while a write is in progress) and discards torn copies.

use crate::backends::camera::types::{CameraFrame, PixelLayout};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering, fence};

/// Header snapshot of a published frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMetadata {
    pub sequence: i64,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub format: PixelLayout,
}

/// A frame copied out of the block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub metadata: StreamMetadata,
    pub pixels: Vec<u8>,
}

#[derive(Debug)]
pub struct SharedFrameBlock {
    sequence: AtomicI64,
    width: AtomicU32,
    height: AtomicU32,
    bytes_per_row: AtomicU32,
    format: AtomicU32,
    ready: AtomicU32,
    generation: AtomicU64,
    pixels: Box<[AtomicU32]>,
}

impl SharedFrameBlock {
    /// Allocate a block holding up to `capacity` bytes of pixels
    pub fn with_capacity(capacity: usize) -> Self {
        let words = capacity.div_ceil(4);
        Self {
            sequence: AtomicI64::new(0),
            width: AtomicU32::new(0),
            height: AtomicU32::new(0),
            bytes_per_row: AtomicU32::new(0),
            format: AtomicU32::new(0),
            ready: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            pixels: (0..words).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Pixel capacity in bytes
    pub fn capacity(&self) -> usize {
        self.pixels.len() * 4
    }

    /// Write a frame. Producer thread only; `frame.data.len()` must fit.
    pub(crate) fn publish(&self, frame: &CameraFrame, sequence: i64) {
        let generation = self.generation.load(Ordering::Relaxed) + 1;
        self.ready.store(0, Ordering::Relaxed);
        self.generation.store(generation, Ordering::Relaxed);
        fence(Ordering::Release);

        self.width.store(frame.width, Ordering::Relaxed);
        self.height.store(frame.height, Ordering::Relaxed);
        self.bytes_per_row
            .store(frame.bytes_per_row(), Ordering::Relaxed);
        self.format.store(frame.layout.code(), Ordering::Relaxed);
        for (word, chunk) in self.pixels.iter().zip(frame.data.chunks_exact(4)) {
            word.store(
                u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
                Ordering::Relaxed,
            );
        }
        self.sequence.store(sequence, Ordering::Relaxed);

        fence(Ordering::Release);
        self.generation.store(generation + 1, Ordering::Relaxed);
        self.ready.store(1, Ordering::Relaxed);
    }

    /// Header of the last complete frame, `None` while a write is in progress
    pub fn metadata(&self) -> Option<StreamMetadata> {
        let generation = self.begin_read()?;
        let metadata = self.load_header()?;
        self.end_read(generation).then_some(metadata)
    }

    /// Copy out the last complete frame
    ///
    /// Returns `None` if no frame was published yet or the producer started
    /// overwriting the block during the copy; callers retry on the next
    /// doorbell.
    pub fn read_frame(&self) -> Option<StreamFrame> {
        let generation = self.begin_read()?;
        let metadata = self.load_header()?;
        let len = (metadata.bytes_per_row as usize * metadata.height as usize)
            .min(self.capacity());

        let mut pixels = Vec::with_capacity(len);
        for word in &self.pixels[..len / 4] {
            pixels.extend_from_slice(&word.load(Ordering::Relaxed).to_ne_bytes());
        }

        self.end_read(generation)
            .then_some(StreamFrame { metadata, pixels })
    }

    fn begin_read(&self) -> Option<u64> {
        if self.ready.load(Ordering::Acquire) != 1 {
            return None;
        }
        let generation = self.generation.load(Ordering::Acquire);
        (generation % 2 == 0).then_some(generation)
    }

    fn end_read(&self, generation: u64) -> bool {
        fence(Ordering::Acquire);
        self.generation.load(Ordering::Relaxed) == generation
    }

    fn load_header(&self) -> Option<StreamMetadata> {
        Some(StreamMetadata {
            sequence: self.sequence.load(Ordering::Relaxed),
            width: self.width.load(Ordering::Relaxed),
            height: self.height.load(Ordering::Relaxed),
            bytes_per_row: self.bytes_per_row.load(Ordering::Relaxed),
            format: PixelLayout::from_code(self.format.load(Ordering::Relaxed))?,
        })
    }
}
