// SPDX-License-Identifier: MPL-2.0

//! Error types for camera sessions
//!
//! Every command on a [`CameraSession`](crate::session::CameraSession) resolves
//! to either its success payload or one of the [`SessionError`] variants. An
//! error is terminal for the call that produced it, never for the session.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors reported to callers of session commands
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `initialize` was called on a session that is not in `Created`
    #[error("Camera session is already initialized")]
    AlreadyInitialized,
    /// The command requires a running (or paused) preview
    #[error("Camera session is not running")]
    NotRunning,
    /// `stop_video_recording` without an active recording
    #[error("No recording in progress")]
    NotRecording,
    /// A recording is already active or starting
    #[error("Recording already in progress")]
    AlreadyRecording,
    /// No frame has been produced yet
    #[error("No frame available for capture")]
    NoFrame,
    /// The capture collaborator could not be opened or started
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
    /// No frame arrived before the initialization deadline
    #[error("Initialization timed out waiting for the first frame")]
    InitializationTimedOut,
    /// Encoding or writing a still photo failed
    #[error("Capture failed: {0}")]
    CaptureFailed(String),
    /// The recording writer could not be configured
    #[error("Recording setup failed: {0}")]
    RecordingSetupFailed(String),
    /// The recording failed while writing or finalizing
    #[error("Recording failed: {0}")]
    RecordingFailed(String),
    /// The session was disposed before the command completed
    #[error("Camera session disposed")]
    Disposed,
}

/// Errors raised while loading or saving configuration files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
