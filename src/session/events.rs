// SPDX-License-Identifier: GPL-3.0-only

//! Asynchronous notifications from a session to the control layer

use crate::pipelines::stream::StreamMetadata;
use tokio::sync::mpsc;

/// Notification posted to the control thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A collaborator failed outside the scope of any pending command
    CameraError { camera_id: i64, description: String },
    /// The session finished tearing down; nothing follows this event
    CameraClosing { camera_id: i64 },
    /// A stream frame in queued-message mode (no doorbell registered)
    ImageStreamFrame {
        camera_id: i64,
        metadata: StreamMetadata,
        bytes: Vec<u8>,
    },
}

impl SessionEvent {
    pub fn camera_id(&self) -> i64 {
        match self {
            SessionEvent::CameraError { camera_id, .. }
            | SessionEvent::CameraClosing { camera_id }
            | SessionEvent::ImageStreamFrame { camera_id, .. } => *camera_id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Create the channel a host passes to its sessions
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
