// SPDX-License-Identifier: GPL-3.0-only

//! Session configuration
//!
//! [`CameraConfig`] is the immutable snapshot a session is constructed with;
//! [`SessionSettings`] holds the tunables of the session machinery itself.
//! Both are persisted together as JSON.

use crate::backends::camera::types::Resolution;
use crate::constants::{self, BitratePreset, framerate, record_queue, timing};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Target capture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResolutionPreset {
    /// 352x288
    Low,
    /// 640x480
    Medium,
    /// 1280x720
    #[default]
    High,
    /// 1920x1080
    VeryHigh,
    /// 3840x2160
    UltraHigh,
    /// Whatever the device offers
    Max,
}

impl ResolutionPreset {
    /// Requested size, or `None` to accept the device's largest format
    pub fn target(&self) -> Option<Resolution> {
        let (width, height) = match self {
            ResolutionPreset::Low => (352, 288),
            ResolutionPreset::Medium => (640, 480),
            ResolutionPreset::High => (1280, 720),
            ResolutionPreset::VeryHigh => (1920, 1080),
            ResolutionPreset::UltraHigh => (3840, 2160),
            ResolutionPreset::Max => return None,
        };
        Some(Resolution::new(width, height))
    }
}

/// Per-session camera configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device identity (device path, or "synthetic" for the test pattern)
    pub device: String,
    pub resolution: ResolutionPreset,
    /// Requested frame rate, clamped to 5..=60
    pub fps: u32,
    pub bitrate_preset: BitratePreset,
    /// Overrides the preset-derived video bitrate
    pub video_bitrate_kbps: Option<u32>,
    pub audio_bitrate_kbps: u32,
    pub enable_audio: bool,
    /// Flip frames horizontally before any consumer sees them
    pub mirrored: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "synthetic".to_string(),
            resolution: ResolutionPreset::default(),
            fps: framerate::DEFAULT_FPS,
            bitrate_preset: BitratePreset::default(),
            video_bitrate_kbps: None,
            audio_bitrate_kbps: constants::DEFAULT_AUDIO_BITRATE_KBPS,
            enable_audio: false,
            mirrored: true,
        }
    }
}

impl CameraConfig {
    /// Frame rate after clamping
    pub fn effective_fps(&self) -> u32 {
        framerate::clamp(self.fps)
    }

    /// Video bitrate for a recording of the given width
    pub fn video_bitrate_for(&self, width: u32) -> u32 {
        self.video_bitrate_kbps
            .unwrap_or_else(|| self.bitrate_preset.bitrate_kbps(width))
    }

    /// Duration of one frame at the effective frame rate
    pub fn frame_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.effective_fps()))
    }
}

/// Tunables of the session machinery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub init_timeout_ms: u64,
    pub max_queued_video_frames: usize,
    pub max_queued_audio_samples: usize,
    pub max_queued_bytes: usize,
    /// Directory for photos and recordings
    pub output_dir: PathBuf,
    pub jpeg_quality: u8,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            init_timeout_ms: timing::INIT_TIMEOUT.as_millis() as u64,
            max_queued_video_frames: record_queue::MAX_VIDEO_FRAMES,
            max_queued_audio_samples: record_queue::MAX_AUDIO_SAMPLES,
            max_queued_bytes: record_queue::MAX_BYTES,
            output_dir: crate::storage::default_output_dir(),
            jpeg_quality: 92,
        }
    }
}

impl SessionSettings {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

/// Persisted configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub session: SessionSettings,
}

impl Config {
    /// Default location: `<config dir>/camera-session/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("camera-session").join("config.json"))
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load a config file, falling back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Write the config as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text).map_err(io_err)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }
}
