// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture source
//!
//! `v4l2src ! videoconvert ! videoscale ! videorate ! BGRA caps ! appsink`.
//! Frames are handed to the sink from the appsink streaming thread; a
//! second thread watches the bus for errors and end-of-stream.

use super::types::{NegotiatedFormat, PixelLayout, RawFrame, Resolution};
use super::{CaptureSource, FrameSink};
use crate::config::CameraConfig;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSinkCallbacks};
use gstreamer_video::VideoInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Bus poll interval; bounds how long `stop` waits for the bus thread
const BUS_POLL_MS: u64 = 100;
/// Requested size when the config asks for the largest format
const FALLBACK_RESOLUTION: Resolution = Resolution::new(1920, 1080);

pub struct GstCaptureSource {
    device: String,
    pipeline: Option<gst::Pipeline>,
    appsink: Option<AppSink>,
    format: Option<NegotiatedFormat>,
    bus_thread: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
}

impl GstCaptureSource {
    /// `device` is a V4L2 device path, or "auto" for `autovideosrc`
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            pipeline: None,
            appsink: None,
            format: None,
            bus_thread: None,
            stop_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    fn pipeline_description(&self, config: &CameraConfig, fps: u32) -> String {
        let source = if self.device == "auto" {
            "autovideosrc".to_string()
        } else {
            format!("v4l2src device={}", self.device)
        };
        let size = config
            .resolution
            .target()
            .map(|r| format!(",width={},height={}", r.width, r.height))
            .unwrap_or_default();
        format!(
            "{source} ! videoconvert ! videoscale ! videorate ! \
             video/x-raw,format=BGRA{size},framerate={fps}/1 ! appsink name=sink"
        )
    }
}

impl CaptureSource for GstCaptureSource {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn open(&mut self, config: &CameraConfig) -> Result<NegotiatedFormat, String> {
        gst::init().map_err(|e| format!("Failed to initialize GStreamer: {e}"))?;

        let fps = config.effective_fps();
        let description = self.pipeline_description(config, fps);
        info!(device = %self.device, pipeline = %description, "Creating capture pipeline");

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| format!("Failed to build capture pipeline: {e}"))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| "Capture description is not a pipeline".to_string())?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| "Failed to get appsink".to_string())?
            .dynamic_cast::<AppSink>()
            .map_err(|_| "Failed to cast appsink".to_string())?;
        appsink.set_property("sync", false);
        appsink.set_property("max-buffers", 2u32);
        appsink.set_property("drop", true);
        appsink.set_property("enable-last-sample", false);

        // READY opens the device, so a busy or missing camera fails here
        pipeline
            .set_state(gst::State::Ready)
            .map_err(|e| format!("Failed to open {}: {e}", self.device))?;

        let format = NegotiatedFormat {
            resolution: config.resolution.target().unwrap_or(FALLBACK_RESOLUTION),
            fps,
            layout: PixelLayout::Bgra,
            audio: None,
        };
        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink);
        self.format = Some(format);
        Ok(format)
    }

    fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), String> {
        let (Some(pipeline), Some(appsink)) = (&self.pipeline, &self.appsink) else {
            return Err("Capture pipeline started before open".to_string());
        };

        let frame_sink = Arc::clone(&sink);
        appsink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    if buffer.flags().contains(gst::BufferFlags::CORRUPTED) {
                        return Ok(gst::FlowSuccess::Ok);
                    }
                    let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                    let info = VideoInfo::from_caps(caps).map_err(|_| gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                    frame_sink.on_frame(RawFrame {
                        pixels: map.as_slice(),
                        width: info.width(),
                        height: info.height(),
                        stride: info.stride()[0] as u32,
                    });
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        let bus = pipeline
            .bus()
            .ok_or_else(|| "Capture pipeline has no bus".to_string())?;
        self.stop_signal.store(false, Ordering::Release);
        let stop_signal = Arc::clone(&self.stop_signal);
        let bus_thread = std::thread::Builder::new()
            .name("gst-capture-bus".to_string())
            .spawn(move || {
                while !stop_signal.load(Ordering::Acquire) {
                    let Some(msg) = bus.timed_pop(gst::ClockTime::from_mseconds(BUS_POLL_MS))
                    else {
                        continue;
                    };
                    match msg.view() {
                        gst::MessageView::Error(err) => {
                            error!(error = %err.error(), debug = ?err.debug(), "Capture pipeline error");
                            sink.on_error(err.error().to_string());
                            break;
                        }
                        gst::MessageView::Eos(_) => {
                            sink.on_end_of_stream();
                            break;
                        }
                        _ => {}
                    }
                }
                debug!("Capture bus thread exiting");
            })
            .map_err(|e| format!("Failed to spawn bus thread: {e}"))?;
        self.bus_thread = Some(bus_thread);

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| format!("Failed to start capture pipeline: {e}"))?;
        info!(device = %self.device, "Capture pipeline playing");
        Ok(())
    }

    fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::Release);
        if let Some(appsink) = self.appsink.take() {
            appsink.set_callbacks(AppSinkCallbacks::builder().build());
        }
        if let Some(pipeline) = self.pipeline.take() {
            // NULL joins the streaming threads
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                warn!(error = %e, "Failed to stop capture pipeline");
            }
        }
        if let Some(handle) = self.bus_thread.take() {
            if handle.join().is_err() {
                warn!("Capture bus thread panicked");
            }
        }
    }
}

impl Drop for GstCaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}
