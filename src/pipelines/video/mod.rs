// SPDX-License-Identifier: MPL-2.0

//! Video recording branch
//!
//! - [`queue`]: bounded, gated work queue with drop-newest backpressure
//! - [`branch`]: recording lifecycle and the background writer thread
//! - [`writer`]: encode/mux collaborator contract and the raw container
//! - `gst_writer`: MP4 through GStreamer (feature `gstreamer`)

pub mod branch;
#[cfg(feature = "gstreamer")]
pub mod gst_writer;
pub mod queue;
pub mod writer;

pub use branch::{BranchState, OnFinished, RecordingBranch, RecordingOutcome};
pub use queue::{Offer, QueueLimits, QueueStats, RecordItem, RecordQueue};
pub use writer::{
    MediaWriter, RawContainerWriter, RawHeader, RawRecord, RawRecordKind, RecordingFormat,
    WriterFactory, default_writer_factory, read_raw_container,
};
