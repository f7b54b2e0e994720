// SPDX-License-Identifier: GPL-3.0-only

//! Session lifecycle state
//!
//! ```text
//! Created ──initialize──▶ Initializing ──first frame──▶ Running ◀──▶ Paused
//!    ▲                         │                           │            │
//!    └──── open/start error ───┤                           │            │
//!                              └── fault/timeout ──▶ Disposing ◀─ dispose
//!                                                          │
//!                                                          ▼
//!                                                       Disposed
//! ```
//!
//! The state lives in a single atomic and every transition is a
//! compare-and-swap, so readers on the producer thread never see a value
//! written outside the cell.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Created = 0,
    Initializing = 1,
    Running = 2,
    Paused = 3,
    Disposing = 4,
    Disposed = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Created,
            1 => SessionState::Initializing,
            2 => SessionState::Running,
            3 => SessionState::Paused,
            4 => SessionState::Disposing,
            _ => SessionState::Disposed,
        }
    }

    /// Frames are flowing and commands that need them are accepted
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Running | SessionState::Paused)
    }

    /// Disposal has begun or finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Disposing | SessionState::Disposed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Initializing => "initializing",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Disposing => "disposing",
            SessionState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(SessionState::Created as u8))
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from` → `to`; on failure returns the state actually found
    pub fn transition(&self, from: SessionState, to: SessionState) -> Result<(), SessionState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(SessionState::from_u8)
    }

    /// Enter `Disposing` from any non-terminal state. Exactly one caller wins.
    pub fn claim_disposing(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if SessionState::from_u8(current).is_terminal() {
                    None
                } else {
                    Some(SessionState::Disposing as u8)
                }
            })
            .is_ok()
    }

    pub fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
