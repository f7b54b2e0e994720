// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands driving a camera session
//!
//! Each command opens one session, waits for it to start, does its work
//! through the same commands a host would issue, and disposes it.

use anyhow::{Context, bail};
use camera_session::backends::camera::{platform_capabilities, source_for_device};
use camera_session::pipelines::stream::StreamMetadata;
use camera_session::session::{self, CameraSession, EventReceiver, SessionServices};
use camera_session::{Config, SessionEvent};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Create a session for the configured device and wait for its first frame
fn open_session(config: Config) -> anyhow::Result<(CameraSession, EventReceiver)> {
    let source = source_for_device(&config.camera.device).map_err(anyhow::Error::msg)?;
    println!("Using camera: {}", config.camera.device);

    let (events, receiver) = session::events::channel();
    let session = CameraSession::new(
        1,
        config.camera,
        config.session,
        source,
        SessionServices::new(events),
    );

    let resolution = session
        .initialize()
        .wait()
        .context("Camera failed to start")?;
    println!("Capture format: {resolution}");
    Ok((session, receiver))
}

fn with_output_dir(mut config: Config, output: Option<PathBuf>) -> anyhow::Result<Config> {
    if let Some(dir) = output {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        config.session.output_dir = dir;
    }
    Ok(config)
}

/// Take a photo once the camera has warmed up
pub fn take_photo(config: Config, output: Option<PathBuf>) -> anyhow::Result<()> {
    let config = with_output_dir(config, output)?;
    let (session, _events) = open_session(config)?;

    // Give auto exposure a moment before capturing
    std::thread::sleep(Duration::from_millis(500));

    println!("Capturing...");
    let path = session.take_picture().wait().context("Photo capture failed")?;
    println!("Photo saved: {}", path.display());
    session.dispose();
    Ok(())
}

/// Record for `duration` seconds
pub fn record_video(
    mut config: Config,
    duration: u64,
    output: Option<PathBuf>,
    enable_audio: bool,
) -> anyhow::Result<()> {
    config.camera.enable_audio = enable_audio;
    let config = with_output_dir(config, output)?;
    let (session, mut events) = open_session(config)?;

    println!("Duration: {duration} seconds");
    if enable_audio {
        println!("Audio: enabled");
    }

    session
        .start_video_recording()
        .wait()
        .context("Failed to start recording")?;
    println!();
    println!("Recording...");

    let start = Instant::now();
    let target = Duration::from_secs(duration);
    while start.elapsed() < target {
        if let Ok(SessionEvent::CameraError { description, .. }) = events.try_recv() {
            println!();
            session.dispose();
            bail!("Camera error while recording: {description}");
        }

        let elapsed = start.elapsed().as_secs();
        print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
        std::io::stdout().flush()?;
        std::thread::sleep(Duration::from_millis(100));
    }
    println!();

    let path = session
        .stop_video_recording()
        .wait()
        .context("Failed to finalize recording")?;
    let stats = session.recording_stats();
    println!(
        "Video saved: {} ({} frames, {} dropped)",
        path.display(),
        stats.accepted_video,
        stats.dropped_video
    );
    session.dispose();
    Ok(())
}

/// Read `frames` frames through the image stream and print their metadata
pub fn stream_frames(config: Config, frames: u32, doorbell: bool) -> anyhow::Result<()> {
    let (session, mut events) = open_session(config)?;
    let timeout = Duration::from_secs(5);

    if doorbell {
        let (ring_tx, ring_rx) = mpsc::channel();
        session.register_stream_doorbell(Arc::new(move |camera_id| {
            let _ = ring_tx.send(camera_id);
        }))?;
        session.start_image_stream();

        let mut last_sequence = 0;
        for _ in 0..frames {
            ring_rx
                .recv_timeout(timeout)
                .context("No stream frame within timeout")?;
            // The producer may already be writing the next frame; skip torn reads
            let Some(frame) = session.stream_block().and_then(|block| block.read_frame()) else {
                continue;
            };
            if frame.metadata.sequence != last_sequence {
                last_sequence = frame.metadata.sequence;
                print_frame(&frame.metadata, frame.pixels.len());
            }
        }
        session.unregister_stream_doorbell();
    } else {
        session.start_image_stream();
        let mut received = 0;
        let deadline = Instant::now() + timeout + Duration::from_millis(u64::from(frames) * 100);
        while received < frames {
            if Instant::now() > deadline {
                bail!("Received {received} of {frames} stream frames before timeout");
            }
            match events.try_recv() {
                Ok(SessionEvent::ImageStreamFrame {
                    metadata, bytes, ..
                }) => {
                    received += 1;
                    print_frame(&metadata, bytes.len());
                }
                Ok(SessionEvent::CameraError { description, .. }) => {
                    bail!("Camera error while streaming: {description}")
                }
                Ok(_) => {}
                Err(_) => std::thread::sleep(Duration::from_millis(5)),
            }
        }
    }

    session.stop_image_stream();
    session.dispose();
    Ok(())
}

fn print_frame(metadata: &StreamMetadata, len: usize) {
    println!(
        "frame {:>5}  {}x{}  stride {}  {:?}  {} bytes",
        metadata.sequence,
        metadata.width,
        metadata.height,
        metadata.bytes_per_row,
        metadata.format,
        len
    );
}

pub fn show_capabilities() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&platform_capabilities())?);
    Ok(())
}

/// Print the effective configuration, optionally saving it
pub fn show_config(config: &Config, save: bool, path: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if save {
        let Some(path) = path else {
            bail!("No config directory available; pass --config");
        };
        config
            .save(path)
            .with_context(|| format!("Failed to save config to {}", path.display()))?;
        println!("Saved: {}", path.display());
    }
    Ok(())
}
