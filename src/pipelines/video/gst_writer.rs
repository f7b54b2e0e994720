// SPDX-License-Identifier: MPL-2.0

//! MP4 writer backed by a GStreamer pipeline
//!
//! ```text
//! appsrc (BGRA/RGBA) ─▶ videoconvert ─▶ x264enc ─▶ h264parse ─┐
//!                                                             ├─▶ mp4mux ─▶ filesink
//! appsrc (S16LE) ─▶ audioconvert ─▶ audioresample ─▶ avenc_aac ┘
//! ```
//!
//! Finalize sends EOS through both sources and waits for it to reach the
//! bus, which is when mp4mux has written its index.

use super::writer::{MediaWriter, RecordingFormat};
use crate::backends::camera::types::{AudioSample, PixelLayout};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use gstreamer_video::{VideoFormat, VideoInfo};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ceiling for EOS to travel through the pipeline on finalize
const FINALIZE_TIMEOUT_SECS: u64 = 10;

#[derive(Default)]
pub struct GstMediaWriter {
    pipeline: Option<gst::Pipeline>,
    video_src: Option<AppSrc>,
    audio_src: Option<AppSrc>,
    output: Option<PathBuf>,
    frame_duration: Option<gst::ClockTime>,
}

impl GstMediaWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn make(factory: &str) -> Result<gst::Element, String> {
        gst::ElementFactory::make(factory)
            .build()
            .map_err(|e| format!("Failed to create {factory}: {e}"))
    }

    fn teardown(&mut self) {
        self.video_src = None;
        self.audio_src = None;
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                warn!(error = %e, "Failed to stop recording pipeline");
            }
        }
    }
}

impl MediaWriter for GstMediaWriter {
    fn extension(&self) -> &'static str {
        "mp4"
    }

    fn configure(&mut self, format: &RecordingFormat, output: &Path) -> Result<(), String> {
        gst::init().map_err(|e| format!("Failed to initialize GStreamer: {e}"))?;
        crate::storage::ensure_parent_dir(output)
            .map_err(|e| format!("Failed to create {}: {e}", output.display()))?;

        let video_format = match format.layout {
            PixelLayout::Bgra => VideoFormat::Bgra,
            PixelLayout::Rgba => VideoFormat::Rgba,
        };
        let fps = format.fps.max(1) as i32;
        let caps = VideoInfo::builder(video_format, format.resolution.width, format.resolution.height)
            .fps(gst::Fraction::new(fps, 1))
            .build()
            .and_then(|info| info.to_caps())
            .map_err(|e| format!("Invalid video caps: {e}"))?;

        let pipeline = gst::Pipeline::new();
        let video_src = AppSrc::builder()
            .caps(&caps)
            .format(gst::Format::Time)
            .build();
        let convert = Self::make("videoconvert")?;
        let encoder = gst::ElementFactory::make("x264enc")
            .property("bitrate", format.video_bitrate_kbps)
            .build()
            .map_err(|e| format!("Failed to create x264enc: {e}"))?;
        let parser = Self::make("h264parse")?;
        let muxer = Self::make("mp4mux")?;
        let sink = gst::ElementFactory::make("filesink")
            .property("location", output.to_string_lossy().to_string())
            .build()
            .map_err(|e| format!("Failed to create filesink: {e}"))?;

        pipeline
            .add_many([
                video_src.upcast_ref::<gst::Element>(),
                &convert,
                &encoder,
                &parser,
                &muxer,
                &sink,
            ])
            .map_err(|e| format!("Failed to add video elements: {e}"))?;
        gst::Element::link_many([
            video_src.upcast_ref::<gst::Element>(),
            &convert,
            &encoder,
            &parser,
            &muxer,
            &sink,
        ])
        .map_err(|e| format!("Failed to link video branch: {e}"))?;

        let audio_src = match format.audio {
            Some(audio) => {
                let caps = gst::Caps::builder("audio/x-raw")
                    .field("format", "S16LE")
                    .field("layout", "interleaved")
                    .field("rate", audio.sample_rate as i32)
                    .field("channels", i32::from(audio.channels))
                    .build();
                let src = AppSrc::builder().caps(&caps).format(gst::Format::Time).build();
                let aconvert = Self::make("audioconvert")?;
                let resample = Self::make("audioresample")?;
                let aac = gst::ElementFactory::make("avenc_aac")
                    .property("bitrate", (format.audio_bitrate_kbps * 1000) as i32)
                    .build()
                    .map_err(|e| format!("Failed to create avenc_aac: {e}"))?;
                pipeline
                    .add_many([src.upcast_ref::<gst::Element>(), &aconvert, &resample, &aac])
                    .map_err(|e| format!("Failed to add audio elements: {e}"))?;
                gst::Element::link_many([
                    src.upcast_ref::<gst::Element>(),
                    &aconvert,
                    &resample,
                    &aac,
                    &muxer,
                ])
                .map_err(|e| format!("Failed to link audio branch: {e}"))?;
                Some(src)
            }
            None => None,
        };

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| format!("Failed to start recording pipeline: {e}"))?;

        info!(
            path = %output.display(),
            resolution = %format.resolution,
            bitrate_kbps = format.video_bitrate_kbps,
            audio = audio_src.is_some(),
            "Recording pipeline playing"
        );
        self.frame_duration = Some(gst::ClockTime::from_nseconds(
            1_000_000_000 / u64::from(format.fps.max(1)),
        ));
        self.pipeline = Some(pipeline);
        self.video_src = Some(video_src);
        self.audio_src = audio_src;
        self.output = Some(output.to_path_buf());
        Ok(())
    }

    fn write_video_frame(&mut self, pixels: &[u8], timestamp: Duration) -> Result<(), String> {
        let src = self
            .video_src
            .as_ref()
            .ok_or_else(|| "Recording pipeline is not configured".to_string())?;
        let mut buffer = gst::Buffer::from_slice(pixels.to_vec());
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(gst::ClockTime::from_nseconds(timestamp.as_nanos() as u64));
            buffer.set_duration(self.frame_duration);
        }
        src.push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| format!("Video appsrc rejected buffer: {e:?}"))
    }

    fn write_audio_sample(
        &mut self,
        sample: &AudioSample,
        timestamp: Duration,
    ) -> Result<(), String> {
        let Some(src) = self.audio_src.as_ref() else {
            // Audio was not configured for this recording
            return Ok(());
        };
        let mut buffer = gst::Buffer::from_slice(sample.data.to_vec());
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(gst::ClockTime::from_nseconds(timestamp.as_nanos() as u64));
        }
        src.push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| format!("Audio appsrc rejected buffer: {e:?}"))
    }

    fn finalize(&mut self) -> Result<PathBuf, String> {
        let (Some(pipeline), Some(output)) = (self.pipeline.clone(), self.output.clone()) else {
            return Err("Recording pipeline is not configured".to_string());
        };

        debug!("Sending EOS to recording pipeline");
        for src in self.video_src.iter().chain(self.audio_src.iter()) {
            if let Err(e) = src.end_of_stream() {
                warn!(error = ?e, "Failed to send EOS to appsrc");
            }
        }

        let bus = pipeline
            .bus()
            .ok_or_else(|| "Recording pipeline has no bus".to_string())?;
        let result = match bus.timed_pop_filtered(
            gst::ClockTime::from_seconds(FINALIZE_TIMEOUT_SECS),
            &[gst::MessageType::Eos, gst::MessageType::Error],
        ) {
            Some(msg) => match msg.view() {
                gst::MessageView::Eos(_) => {
                    // Finalized output must survive a later discard
                    self.output = None;
                    Ok(output)
                }
                gst::MessageView::Error(err) => Err(format!("Recording pipeline error: {}", err.error())),
                _ => Err("Unexpected message while finalizing".to_string()),
            },
            None => Err("Timed out waiting for recording to finalize".to_string()),
        };
        self.teardown();
        result
    }

    fn discard(&mut self) {
        self.teardown();
        if let Some(output) = self.output.take() {
            if output.exists() {
                if let Err(e) = std::fs::remove_file(&output) {
                    warn!(path = %output.display(), error = %e, "Failed to remove partial recording");
                }
            }
        }
    }
}

impl Drop for GstMediaWriter {
    fn drop(&mut self) {
        self.teardown();
    }
}
