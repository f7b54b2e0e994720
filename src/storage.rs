// SPDX-License-Identifier: MPL-2.0

//! Output file naming for photos and recordings

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Process-wide photo counter, shared by all sessions
static PHOTO_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Default directory for photos and recordings
pub fn default_output_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Path for the next photo of a camera: `camera_session_{id}_{seq}.{ext}`
pub fn photo_path(dir: &Path, camera_id: i64, extension: &str) -> PathBuf {
    let seq = PHOTO_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    dir.join(format!("camera_session_{camera_id}_{seq}.{extension}"))
}

/// Path for a new recording, stamped with the local time
pub fn video_path(dir: &Path, camera_id: i64, extension: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
    dir.join(format!("camera_session_{camera_id}_{stamp}.{extension}"))
}

/// Create the parent directory of `path` if it is missing
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            debug!(dir = %parent.display(), "Creating output directory");
            std::fs::create_dir_all(parent)
        }
        _ => Ok(()),
    }
}
