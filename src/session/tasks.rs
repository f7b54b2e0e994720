// SPDX-License-Identifier: GPL-3.0-only

//! Background threads owned by a session
//!
//! Photo encodes, initialization and recording setup run here so the
//! control thread never blocks. Disposal closes the set and joins every
//! thread before releasing what they might touch.

use crate::sync::lock;
use std::sync::Mutex;
use std::thread::JoinHandle;
use tracing::warn;

#[derive(Default)]
struct TaskSet {
    handles: Vec<JoinHandle<()>>,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct BackgroundTasks {
    set: Mutex<TaskSet>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` on a named thread
    ///
    /// Returns false, dropping `task` unrun, once the set is closed or the
    /// thread could not be spawned.
    pub fn spawn<F>(&self, name: String, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut set = lock(&self.set);
        if set.closed {
            return false;
        }
        set.handles.retain(|handle| !handle.is_finished());

        match std::thread::Builder::new().name(name.clone()).spawn(task) {
            Ok(handle) => {
                set.handles.push(handle);
                true
            }
            Err(e) => {
                warn!(task = %name, error = %e, "Failed to spawn background task");
                false
            }
        }
    }

    /// Refuse new tasks and wait for the running ones
    pub fn close_and_join(&self) {
        let handles = {
            let mut set = lock(&self.set);
            set.closed = true;
            std::mem::take(&mut set.handles)
        };
        for handle in handles {
            let name = handle.thread().name().unwrap_or("task").to_string();
            if handle.join().is_err() {
                warn!(task = %name, "Background task panicked");
            }
        }
    }
}
