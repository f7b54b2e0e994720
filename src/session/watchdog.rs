// SPDX-License-Identifier: GPL-3.0-only

//! Cancelable initialization deadline

use crate::sync::lock;
use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Thread that runs a callback unless canceled within the timeout
pub(crate) struct InitWatchdog {
    cancelled: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl InitWatchdog {
    pub fn arm<F>(camera_id: i64, timeout: Duration, on_fire: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let cancelled = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Arc::clone(&cancelled);

        let handle = std::thread::Builder::new()
            .name(format!("init-watchdog-{camera_id}"))
            .spawn(move || {
                let (flag, condvar) = &*signal;
                let guard = lock(flag);
                let (guard, _) = condvar
                    .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
                    .unwrap_or_else(PoisonError::into_inner);
                let fire = !*guard;
                drop(guard);

                if fire {
                    debug!(camera_id, timeout_ms = timeout.as_millis() as u64, "Init watchdog fired");
                    on_fire();
                }
            })?;

        Ok(Self {
            cancelled,
            handle: Some(handle),
        })
    }

    /// Disarm without waiting. A callback already running is not interrupted.
    pub fn cancel(&self) {
        let (flag, condvar) = &*self.cancelled;
        *lock(flag) = true;
        condvar.notify_all();
    }

    /// Disarm and wait for the thread to exit
    pub fn join(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Init watchdog thread panicked");
            }
        }
    }
}

impl Drop for InitWatchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}
