// SPDX-License-Identifier: GPL-3.0-only

//! Handle table owned by the hosting layer
//!
//! Allocates camera ids, maps them to sessions, and maps stream handles to
//! the camera whose stream they read. Host entry points look sessions up
//! here instead of through a process-wide "current instance".

use super::camera_session::CameraSession;
use crate::errors::{SessionError, SessionResult};
use crate::pipelines::stream::{Doorbell, SharedFrameBlock};
use crate::sync::lock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Default)]
pub struct SessionRegistry {
    next_camera_id: AtomicI64,
    next_stream_handle: AtomicI64,
    sessions: Mutex<HashMap<i64, Arc<CameraSession>>>,
    stream_handles: Mutex<HashMap<i64, i64>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next camera id and register the session built for it
    pub fn create<F>(&self, build: F) -> Arc<CameraSession>
    where
        F: FnOnce(i64) -> CameraSession,
    {
        let camera_id = self.next_camera_id.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Arc::new(build(camera_id));
        lock(&self.sessions).insert(camera_id, Arc::clone(&session));
        debug!(camera_id, "Session registered");
        session
    }

    pub fn get(&self, camera_id: i64) -> Option<Arc<CameraSession>> {
        lock(&self.sessions).get(&camera_id).cloned()
    }

    pub fn camera_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = lock(&self.sessions).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and dispose a session; false if the id is unknown
    pub fn dispose(&self, camera_id: i64) -> bool {
        let Some(session) = lock(&self.sessions).remove(&camera_id) else {
            return false;
        };
        lock(&self.stream_handles).retain(|_, id| *id != camera_id);
        session.dispose();
        true
    }

    pub fn dispose_all(&self) {
        let sessions: Vec<Arc<CameraSession>> =
            lock(&self.sessions).drain().map(|(_, s)| s).collect();
        lock(&self.stream_handles).clear();
        if !sessions.is_empty() {
            info!(count = sessions.len(), "Disposing all camera sessions");
        }
        for session in sessions {
            session.dispose();
        }
    }

    /// Issue a stream handle for a registered camera
    pub fn open_stream_handle(&self, camera_id: i64) -> Option<i64> {
        if !lock(&self.sessions).contains_key(&camera_id) {
            return None;
        }
        let handle = self.next_stream_handle.fetch_add(1, Ordering::Relaxed) + 1;
        lock(&self.stream_handles).insert(handle, camera_id);
        debug!(camera_id, handle, "Stream handle opened");
        Some(handle)
    }

    /// Close a stream handle, detaching its doorbell
    pub fn close_stream_handle(&self, handle: i64) -> bool {
        let Some(camera_id) = lock(&self.stream_handles).remove(&handle) else {
            return false;
        };
        if let Some(session) = self.get(camera_id) {
            session.unregister_stream_doorbell();
        }
        true
    }

    fn session_for_handle(&self, handle: i64) -> Option<Arc<CameraSession>> {
        let camera_id = *lock(&self.stream_handles).get(&handle)?;
        self.get(camera_id)
    }

    pub fn register_stream_doorbell(&self, handle: i64, doorbell: Doorbell) -> SessionResult<()> {
        self.session_for_handle(handle)
            .ok_or(SessionError::Disposed)?
            .register_stream_doorbell(doorbell)
    }

    pub fn unregister_stream_doorbell(&self, handle: i64) -> bool {
        self.session_for_handle(handle)
            .is_some_and(|session| session.unregister_stream_doorbell())
    }

    pub fn stream_block(&self, handle: i64) -> Option<Arc<SharedFrameBlock>> {
        self.session_for_handle(handle)?.stream_block()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::SyntheticSource;
    use crate::config::{CameraConfig, SessionSettings};
    use crate::session::SessionServices;
    use crate::session::events;
    use std::sync::Arc;

    fn build(registry: &SessionRegistry) -> Arc<CameraSession> {
        let (tx, _rx) = events::channel();
        registry.create(|id| {
            CameraSession::new(
                id,
                CameraConfig::default(),
                SessionSettings::default(),
                Box::new(SyntheticSource::new()),
                SessionServices::new(tx),
            )
        })
    }

    #[test]
    fn test_ids_are_monotonic() {
        let registry = SessionRegistry::new();
        let a = build(&registry);
        let b = build(&registry);
        assert!(b.id() > a.id());
        assert_eq!(registry.camera_ids(), vec![a.id(), b.id()]);
    }

    #[test]
    fn test_stream_handles_route_to_camera() {
        let registry = SessionRegistry::new();
        let session = build(&registry);
        assert_eq!(registry.open_stream_handle(999), None);

        let handle = registry.open_stream_handle(session.id()).unwrap();
        registry
            .register_stream_doorbell(handle, Arc::new(|_| {}))
            .unwrap();
        assert!(registry.unregister_stream_doorbell(handle));
        assert!(!registry.unregister_stream_doorbell(handle));
        assert!(registry.close_stream_handle(handle));
        assert_eq!(
            registry.register_stream_doorbell(handle, Arc::new(|_| {})),
            Err(SessionError::Disposed)
        );
    }

    #[test]
    fn test_dispose_removes_session_and_handles() {
        let registry = SessionRegistry::new();
        let session = build(&registry);
        let handle = registry.open_stream_handle(session.id()).unwrap();

        assert!(registry.dispose(session.id()));
        assert!(!registry.dispose(session.id()));
        assert!(registry.is_empty());
        assert!(registry.stream_block(handle).is_none());
        assert_eq!(session.state(), crate::session::SessionState::Disposed);
    }
}
