// SPDX-License-Identifier: GPL-3.0-only

//! Encode/mux collaborator contract and the built-in raw container writer
//!
//! The raw container is what recordings produce without the `gstreamer`
//! feature: a magic line, one JSON header line, then length-prefixed
//! records `[kind u8][timestamp_us u64 LE][len u32 LE][payload]`. Data goes
//! to a `.part` file that is renamed into place by `finalize`, so the output
//! path only ever holds a complete recording.

use crate::backends::camera::types::{AudioFormat, AudioSample, PixelLayout, Resolution};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything a writer needs to set up its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingFormat {
    pub resolution: Resolution,
    pub fps: u32,
    pub layout: PixelLayout,
    pub video_bitrate_kbps: u32,
    pub audio: Option<AudioFormat>,
    pub audio_bitrate_kbps: u32,
}

/// Encode/mux collaborator driven by the recording writer thread
pub trait MediaWriter: Send {
    /// File extension of the produced container
    fn extension(&self) -> &'static str;

    /// Prepare to write `format` into `output`
    fn configure(&mut self, format: &RecordingFormat, output: &Path) -> Result<(), String>;

    fn write_video_frame(&mut self, pixels: &[u8], timestamp: Duration) -> Result<(), String>;

    fn write_audio_sample(&mut self, sample: &AudioSample, timestamp: Duration)
    -> Result<(), String>;

    /// Flush and close the container; returns the finished file
    fn finalize(&mut self) -> Result<PathBuf, String>;

    /// Abandon the recording and remove partial output
    fn discard(&mut self) {}
}

/// Creates one writer per recording
pub type WriterFactory = Arc<dyn Fn() -> Box<dyn MediaWriter> + Send + Sync>;

/// MP4 via GStreamer when compiled in, the raw container otherwise
pub fn default_writer_factory() -> WriterFactory {
    #[cfg(feature = "gstreamer")]
    {
        Arc::new(|| Box::new(super::gst_writer::GstMediaWriter::new()) as Box<dyn MediaWriter>)
    }
    #[cfg(not(feature = "gstreamer"))]
    {
        Arc::new(|| Box::new(RawContainerWriter::new()) as Box<dyn MediaWriter>)
    }
}

const RAW_MAGIC: &[u8] = b"CSRAW1\n";
const KIND_VIDEO: u8 = 0;
const KIND_AUDIO: u8 = 1;

/// Header line of a raw container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHeader {
    pub format: RecordingFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawRecordKind {
    Video,
    Audio,
}

/// One record of a raw container, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord {
    pub kind: RawRecordKind,
    pub timestamp: Duration,
    pub len: usize,
}

/// Writes the raw container format
#[derive(Default)]
pub struct RawContainerWriter {
    output: Option<PathBuf>,
    partial: Option<PathBuf>,
    file: Option<BufWriter<File>>,
    records: u64,
}

impl RawContainerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_record(&mut self, kind: u8, timestamp: Duration, payload: &[u8]) -> Result<(), String> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| "Raw writer is not configured".to_string())?;
        let len = u32::try_from(payload.len())
            .map_err(|_| format!("Record of {} bytes is too large", payload.len()))?;
        let timestamp_us = u64::try_from(timestamp.as_micros()).unwrap_or(u64::MAX);

        file.write_all(&[kind])
            .and_then(|_| file.write_all(&timestamp_us.to_le_bytes()))
            .and_then(|_| file.write_all(&len.to_le_bytes()))
            .and_then(|_| file.write_all(payload))
            .map_err(|e| format!("Failed to write record: {e}"))?;
        self.records += 1;
        Ok(())
    }
}

impl MediaWriter for RawContainerWriter {
    fn extension(&self) -> &'static str {
        "raw"
    }

    fn configure(&mut self, format: &RecordingFormat, output: &Path) -> Result<(), String> {
        crate::storage::ensure_parent_dir(output)
            .map_err(|e| format!("Failed to create {}: {e}", output.display()))?;
        let partial = output.with_extension("raw.part");
        let file = File::create(&partial)
            .map_err(|e| format!("Failed to create {}: {e}", partial.display()))?;
        let mut file = BufWriter::new(file);

        let header = serde_json::to_string(&RawHeader { format: *format })
            .map_err(|e| format!("Failed to encode header: {e}"))?;
        file.write_all(RAW_MAGIC)
            .and_then(|_| file.write_all(header.as_bytes()))
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|e| format!("Failed to write header: {e}"))?;

        debug!(path = %partial.display(), "Raw container opened");
        self.output = Some(output.to_path_buf());
        self.partial = Some(partial);
        self.file = Some(file);
        self.records = 0;
        Ok(())
    }

    fn write_video_frame(&mut self, pixels: &[u8], timestamp: Duration) -> Result<(), String> {
        self.write_record(KIND_VIDEO, timestamp, pixels)
    }

    fn write_audio_sample(
        &mut self,
        sample: &AudioSample,
        timestamp: Duration,
    ) -> Result<(), String> {
        self.write_record(KIND_AUDIO, timestamp, &sample.data)
    }

    fn finalize(&mut self) -> Result<PathBuf, String> {
        let (Some(file), Some(partial), Some(output)) =
            (self.file.take(), self.partial.take(), self.output.take())
        else {
            return Err("Raw writer is not configured".to_string());
        };

        let file = file
            .into_inner()
            .map_err(|e| format!("Failed to flush recording: {}", e.error()))?;
        file.sync_all()
            .map_err(|e| format!("Failed to sync recording: {e}"))?;
        drop(file);
        std::fs::rename(&partial, &output)
            .map_err(|e| format!("Failed to move recording into place: {e}"))?;

        info!(path = %output.display(), records = self.records, "Raw recording finalized");
        Ok(output)
    }

    fn discard(&mut self) {
        self.file = None;
        self.output = None;
        if let Some(partial) = self.partial.take() {
            if let Err(e) = std::fs::remove_file(&partial) {
                warn!(path = %partial.display(), error = %e, "Failed to remove partial recording");
            }
        }
    }
}

/// Read back the header and record index of a raw container
pub fn read_raw_container(path: &Path) -> Result<(RawHeader, Vec<RawRecord>), String> {
    let file = File::open(path).map_err(|e| format!("Failed to open {}: {e}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;

    let rest = bytes
        .strip_prefix(RAW_MAGIC)
        .ok_or_else(|| "Not a raw container".to_string())?;
    let header_end = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| "Truncated header".to_string())?;
    let header: RawHeader = serde_json::from_slice(&rest[..header_end])
        .map_err(|e| format!("Invalid header: {e}"))?;

    let mut records = Vec::new();
    let mut cursor = &rest[header_end + 1..];
    while !cursor.is_empty() {
        if cursor.len() < 13 {
            return Err("Truncated record header".to_string());
        }
        let kind = match cursor[0] {
            KIND_VIDEO => RawRecordKind::Video,
            KIND_AUDIO => RawRecordKind::Audio,
            other => return Err(format!("Unknown record kind {other}")),
        };
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&cursor[1..9]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&cursor[9..13]);
        let len = u32::from_le_bytes(len) as usize;
        if cursor.len() < 13 + len {
            return Err("Truncated record payload".to_string());
        }
        records.push(RawRecord {
            kind,
            timestamp: Duration::from_micros(u64::from_le_bytes(ts)),
            len,
        });
        cursor = &cursor[13 + len..];
    }
    Ok((header, records))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> RecordingFormat {
        RecordingFormat {
            resolution: Resolution::new(2, 2),
            fps: 25,
            layout: PixelLayout::Bgra,
            video_bitrate_kbps: 1000,
            audio: None,
            audio_bitrate_kbps: 128,
        }
    }

    #[test]
    fn test_finalize_moves_file_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.raw");
        let mut writer = RawContainerWriter::new();
        writer.configure(&format(), &output).unwrap();
        assert!(!output.exists());

        writer
            .write_video_frame(&[1u8; 16], Duration::from_millis(0))
            .unwrap();
        writer
            .write_video_frame(&[2u8; 16], Duration::from_millis(40))
            .unwrap();
        assert_eq!(writer.finalize().unwrap(), output);

        let (header, records) = read_raw_container(&output).unwrap();
        assert_eq!(header.format, format());
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].timestamp, Duration::from_millis(40));
        assert!(writer.finalize().is_err());
    }

    #[test]
    fn test_discard_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.raw");
        let mut writer = RawContainerWriter::new();
        writer.configure(&format(), &output).unwrap();
        writer.discard();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
