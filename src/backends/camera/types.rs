// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the capture collaborator contract

//! Frame, audio and format types exchanged between capture sources and the session

use crate::constants::BYTES_PER_PIXEL;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of a tightly packed 4-byte-per-pixel frame
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Channel order of the 4-byte pixels delivered by a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelLayout {
    #[default]
    Bgra,
    Rgba,
}

impl PixelLayout {
    /// Wire code published in stream metadata (0 = BGRA, 1 = RGBA)
    pub fn code(&self) -> u32 {
        match self {
            PixelLayout::Bgra => 0,
            PixelLayout::Rgba => 1,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(PixelLayout::Bgra),
            1 => Some(PixelLayout::Rgba),
            _ => None,
        }
    }
}

/// Audio stream parameters (interleaved signed 16-bit PCM)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Format agreed with the device by [`CaptureSource::open`](super::CaptureSource::open)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub resolution: Resolution,
    pub fps: u32,
    pub layout: PixelLayout,
    /// Present when the source also delivers audio
    pub audio: Option<AudioFormat>,
}

/// Borrowed frame as delivered by a source on its producer thread
///
/// Rows may be padded: `stride` is the distance in bytes between the starts
/// of consecutive rows.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

impl<'a> RawFrame<'a> {
    /// A frame without row padding
    pub fn packed(pixels: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
            stride: width * BYTES_PER_PIXEL as u32,
        }
    }

    /// Copy into a tightly packed buffer, dropping any row padding
    pub fn pack(&self) -> Result<Arc<[u8]>, String> {
        self.packed_rows().map(Arc::from)
    }

    /// Like [`pack`](Self::pack), with every row flipped horizontally
    pub fn pack_mirrored(&self) -> Result<Arc<[u8]>, String> {
        let mut packed = self.packed_rows()?;
        let row_len = self.width as usize * BYTES_PER_PIXEL;
        for row in packed.chunks_exact_mut(row_len) {
            let pixels = self.width as usize;
            for left in 0..pixels / 2 {
                let right = pixels - 1 - left;
                for byte in 0..BYTES_PER_PIXEL {
                    row.swap(left * BYTES_PER_PIXEL + byte, right * BYTES_PER_PIXEL + byte);
                }
            }
        }
        Ok(Arc::from(packed))
    }

    fn packed_rows(&self) -> Result<Vec<u8>, String> {
        let row_len = self.width as usize * BYTES_PER_PIXEL;
        let stride = self.stride as usize;
        let rows = self.height as usize;
        if row_len == 0 || rows == 0 {
            return Err(format!("Empty frame {}x{}", self.width, self.height));
        }
        if stride < row_len {
            return Err(format!("Stride {stride} shorter than row of {row_len} bytes"));
        }
        let needed = stride * (rows - 1) + row_len;
        if self.pixels.len() < needed {
            return Err(format!(
                "Frame buffer holds {} bytes, {}x{} with stride {} needs {}",
                self.pixels.len(),
                self.width,
                self.height,
                stride,
                needed
            ));
        }

        if stride == row_len {
            return Ok(self.pixels[..row_len * rows].to_vec());
        }
        let mut packed = Vec::with_capacity(row_len * rows);
        for row in self.pixels.chunks(stride).take(rows) {
            packed.extend_from_slice(&row[..row_len]);
        }
        Ok(packed)
    }
}

/// A packed frame owned by the session and shared between its sinks
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    /// Tightly packed pixels, `width * height * 4` bytes
    pub data: Arc<[u8]>,
    /// Position in the session's frame sequence
    pub sequence: u64,
    pub captured_at: Instant,
}

impl CameraFrame {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.width * BYTES_PER_PIXEL as u32
    }
}

/// What the running platform lets a host control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    pub supports_mirror_control: bool,
    pub supports_video_fps_control: bool,
    pub supports_video_bitrate_control: bool,
    /// Accepted frame rates, inclusive
    pub fps_range: (u32, u32),
    /// Names of the video bitrate presets, lowest first
    pub bitrate_presets: Vec<String>,
}

/// A chunk of captured audio
#[derive(Debug, Clone)]
pub struct AudioSample {
    pub data: Arc<[u8]>,
    pub format: AudioFormat,
    pub captured_at: Instant,
}
