// SPDX-License-Identifier: GPL-3.0-only

//! Camera session lifecycle
//!
//! - [`CameraSession`]: one open camera, its commands and its teardown
//! - [`SessionRegistry`]: camera ids and stream handles for the host layer
//! - [`Completion`]: result handle returned by asynchronous commands
//! - [`PendingOperationTable`]: commands waiting on the producer or a
//!   background thread
//! - [`events`]: notifications posted to the control thread

mod camera_session;
pub mod completion;
pub mod events;
pub mod pending;
pub mod registry;
pub mod state;
mod tasks;
mod watchdog;

pub use self::camera_session::{CameraSession, SessionServices};
pub use completion::Completion;
pub use events::{EventReceiver, EventSender, SessionEvent};
pub use pending::{OperationKind, PendingOperationTable};
pub use registry::SessionRegistry;
pub use state::SessionState;
