// SPDX-License-Identifier: MPL-2.0

//! Capture collaborator contract
//!
//! ```text
//! ┌─────────────────────┐
//! │    CameraSession    │  ← lifecycle, command completions
//! └──────────┬──────────┘
//!            │ open / start / stop
//!            ▼
//! ┌─────────────────────┐
//! │ CaptureSource trait │  ← owns the producer thread(s)
//! └──────────┬──────────┘
//!            │ on_frame / on_audio / on_error / on_end_of_stream
//!            ▼
//! ┌─────────────────────┐
//! │   FrameSink trait   │  ← implemented by the session
//! └─────────────────────┘
//! ```

pub mod frame_loop;
#[cfg(feature = "gstreamer")]
pub mod gst_source;
pub mod synthetic;
pub mod types;

pub use frame_loop::{CaptureLoopController, LoopAction};
pub use synthetic::SyntheticSource;
pub use types::*;

use crate::config::CameraConfig;
use crate::constants::{BitratePreset, framerate};
use std::sync::Arc;

/// Receiver of everything a capture source produces
///
/// All methods are called on the source's producer thread(s) and must not
/// block on anything the control thread may hold.
pub trait FrameSink: Send + Sync {
    /// A decoded frame in the negotiated pixel layout
    fn on_frame(&self, frame: RawFrame<'_>);

    /// A chunk of captured audio
    fn on_audio(&self, sample: AudioSample);

    /// The source hit an unrecoverable error
    fn on_error(&self, description: String);

    /// The source stopped producing without being asked to
    fn on_end_of_stream(&self);
}

/// A camera device (or stand-in) producing frames on its own thread(s)
pub trait CaptureSource: Send {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Acquire the device and agree on a format
    fn open(&mut self, config: &CameraConfig) -> Result<NegotiatedFormat, String>;

    /// Begin delivering frames to `sink`
    fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), String>;

    /// Stop delivery and join the producer thread(s)
    ///
    /// Once this returns no sink method is running or will run again.
    /// Calling it on a source that never started is a no-op.
    fn stop(&mut self);
}

/// Create the capture source for a configured device
///
/// "synthetic" selects the built-in test pattern; any other identity
/// requires the `gstreamer` feature.
pub fn source_for_device(device: &str) -> Result<Box<dyn CaptureSource>, String> {
    if device == "synthetic" {
        return Ok(Box::new(SyntheticSource::new()));
    }

    #[cfg(feature = "gstreamer")]
    {
        Ok(Box::new(gst_source::GstCaptureSource::new(device)))
    }

    #[cfg(not(feature = "gstreamer"))]
    {
        Err(format!(
            "Device '{device}' needs the gstreamer feature; only 'synthetic' is available"
        ))
    }
}

/// Controls every session on this platform honours
///
/// Mirroring is done in software on packed frames, so it is available for
/// every source, the synthetic one included.
pub fn platform_capabilities() -> PlatformCapabilities {
    PlatformCapabilities {
        supports_mirror_control: true,
        supports_video_fps_control: true,
        supports_video_bitrate_control: true,
        fps_range: (framerate::MIN_FPS, framerate::MAX_FPS),
        bitrate_presets: BitratePreset::ALL
            .iter()
            .map(|preset| preset.display_name().to_string())
            .collect(),
    }
}
