// SPDX-License-Identifier: GPL-3.0-only

//! Display surface registrar contract
//!
//! The host framework owns the texture that shows the preview. A session
//! registers one texture at construction, signals it after every frame it
//! publishes to the [`FrameSlotRing`](crate::pipelines::preview::FrameSlotRing),
//! and unregisters it during disposal.

use std::sync::atomic::{AtomicI64, Ordering};

/// Host-side identifier of a registered texture
pub type TextureId = i64;

pub trait TextureRegistrar: Send + Sync {
    fn register(&self) -> TextureId;

    /// Called on the producer thread; must not block
    fn mark_frame_available(&self, id: TextureId);

    fn unregister(&self, id: TextureId);
}

/// Registrar for hosts without a display (command line, tests)
#[derive(Debug, Default)]
pub struct NoopTextureRegistrar {
    next_id: AtomicI64,
}

impl TextureRegistrar for NoopTextureRegistrar {
    fn register(&self) -> TextureId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn mark_frame_available(&self, _id: TextureId) {}

    fn unregister(&self, _id: TextureId) {}
}
