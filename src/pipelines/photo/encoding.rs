// SPDX-License-Identifier: GPL-3.0-only

//! Photo encoding
//!
//! Frames arrive as packed 4-byte pixels in the source's channel order;
//! encoders drop alpha and write RGB.

use crate::backends::camera::types::{CameraFrame, PixelLayout};
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Still image encoder used by `take_picture`
pub trait PhotoEncoder: Send + Sync {
    /// File extension of the encoded image
    fn extension(&self) -> &'static str;

    /// Encode packed pixels of the given size and layout
    fn encode(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        layout: PixelLayout,
    ) -> Result<Vec<u8>, String>;
}

/// Baseline JPEG through the `image` crate
#[derive(Debug, Clone, Copy)]
pub struct JpegPhotoEncoder {
    quality: u8,
}

impl JpegPhotoEncoder {
    /// `quality` is clamped to 1..=100
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegPhotoEncoder {
    fn default() -> Self {
        Self::new(92)
    }
}

impl PhotoEncoder for JpegPhotoEncoder {
    fn extension(&self) -> &'static str {
        "jpg"
    }

    fn encode(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        layout: PixelLayout,
    ) -> Result<Vec<u8>, String> {
        let rgb = to_rgb(pixels, width, height, layout)?;
        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, self.quality)
            .encode(&rgb, width, height, ExtendedColorType::Rgb8)
            .map_err(|e| format!("JPEG encoding failed: {e}"))?;
        debug!(width, height, size = data.len(), quality = self.quality, "Encoded JPEG");
        Ok(data)
    }
}

/// Strip alpha and reorder channels to RGB
fn to_rgb(pixels: &[u8], width: u32, height: u32, layout: PixelLayout) -> Result<Vec<u8>, String> {
    let count = width as usize * height as usize;
    if count == 0 {
        return Err(format!("Cannot encode empty image {width}x{height}"));
    }
    if pixels.len() < count * 4 {
        return Err(format!(
            "Image {width}x{height} needs {} bytes, got {}",
            count * 4,
            pixels.len()
        ));
    }

    let mut rgb = Vec::with_capacity(count * 3);
    for px in pixels[..count * 4].chunks_exact(4) {
        match layout {
            PixelLayout::Bgra => rgb.extend_from_slice(&[px[2], px[1], px[0]]),
            PixelLayout::Rgba => rgb.extend_from_slice(&px[..3]),
        }
    }
    Ok(rgb)
}

/// Encode `frame` and write it to `path`
pub fn save_frame(
    encoder: &dyn PhotoEncoder,
    frame: &CameraFrame,
    path: &Path,
) -> Result<PathBuf, String> {
    let data = encoder.encode(&frame.data, frame.width, frame.height, frame.layout)?;
    crate::storage::ensure_parent_dir(path)
        .map_err(|e| format!("Failed to create {}: {e}", path.display()))?;
    std::fs::write(path, &data).map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
    info!(
        path = %path.display(),
        size = data.len(),
        sequence = frame.sequence,
        "Photo saved"
    );
    Ok(path.to_path_buf())
}
