// SPDX-License-Identifier: GPL-3.0-only

//! Session-wide constants and encoder presets

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bytes per pixel of every frame handed to the session sinks (BGRA or RGBA)
pub const BYTES_PER_PIXEL: usize = 4;

/// Session timing
pub mod timing {
    use super::Duration;

    /// Ceiling for the first frame to arrive after `initialize`
    pub const INIT_TIMEOUT: Duration = Duration::from_millis(8000);
    /// Per-frame logging interval on the producer thread
    pub const FRAME_LOG_INTERVAL: u64 = 300;
}

/// Frame rate limits applied to the requested rate
pub mod framerate {
    pub const MIN_FPS: u32 = 5;
    pub const MAX_FPS: u32 = 60;
    pub const DEFAULT_FPS: u32 = 30;

    /// Clamp a requested frame rate into the supported range
    pub fn clamp(fps: u32) -> u32 {
        fps.clamp(MIN_FPS, MAX_FPS)
    }
}

/// Default limits of the recording work queue
pub mod record_queue {
    /// About three seconds of video at the default frame rate
    pub const MAX_VIDEO_FRAMES: usize = 90;
    pub const MAX_AUDIO_SAMPLES: usize = 256;
    pub const MAX_BYTES: usize = 256 * 1024 * 1024;
}

/// Default audio encoder bitrate
pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 128;

/// Video encoder bitrate presets
///
/// The preset picks a column in the per-tier bitrate table; the tier is
/// derived from the recording width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Smaller files, reduced quality
    Low,
    /// Balanced quality and file size
    #[default]
    Medium,
    /// Larger files, better quality
    High,
}

impl BitratePreset {
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Bitrate in kbps for a recording of the given width
    pub fn bitrate_kbps(&self, width: u32) -> u32 {
        self.bitrate_for_tier(ResolutionTier::for_width(width))
    }

    /// Bitrate in kbps for a resolution tier
    pub fn bitrate_for_tier(&self, tier: ResolutionTier) -> u32 {
        // Low, Medium, High
        let row: [u32; 3] = match tier {
            ResolutionTier::SD => [1_000, 2_000, 4_000],
            ResolutionTier::HD => [2_500, 5_000, 10_000],
            ResolutionTier::FullHD => [4_000, 8_000, 16_000],
            ResolutionTier::TwoK => [8_000, 16_000, 32_000],
            ResolutionTier::FourK => [15_000, 30_000, 50_000],
        };
        match self {
            BitratePreset::Low => row[0],
            BitratePreset::Medium => row[1],
            BitratePreset::High => row[2],
        }
    }
}

/// Resolution tiers used for bitrate selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResolutionTier {
    /// 640x480 and below
    SD,
    /// 1280x720
    HD,
    /// 1920x1080
    FullHD,
    /// 2560x1440
    TwoK,
    /// 3840x2160 and above
    FourK,
}

impl ResolutionTier {
    pub fn for_width(width: u32) -> Self {
        match width {
            w if w >= 3840 => ResolutionTier::FourK,
            w if w >= 2560 => ResolutionTier::TwoK,
            w if w >= 1920 => ResolutionTier::FullHD,
            w if w >= 1280 => ResolutionTier::HD,
            _ => ResolutionTier::SD,
        }
    }
}
