// SPDX-License-Identifier: MPL-2.0

//! Camera session - a camera exposed as a frame source, photo capturer and
//! video recorder to a single control thread
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`session`]: session lifecycle, pending commands and the handle registry
//! - [`backends`]: capture source and display registrar contracts
//! - [`pipelines`]: preview triple buffer, stream channel, recording branch
//!   and photo encoding
//! - [`config`]: camera and session configuration
//! - [`storage`]: output file naming
//!
//! # Example
//!
//! ```no_run
//! use camera_session::backends::camera::SyntheticSource;
//! use camera_session::session::{self, CameraSession, SessionServices};
//! use camera_session::{CameraConfig, SessionSettings};
//!
//! let (events, _rx) = session::events::channel();
//! let session = CameraSession::new(
//!     1,
//!     CameraConfig::default(),
//!     SessionSettings::default(),
//!     Box::new(SyntheticSource::new()),
//!     SessionServices::new(events),
//! );
//! let resolution = session.initialize().wait()?;
//! println!("Running at {resolution}");
//! let photo = session.take_picture().wait()?;
//! println!("Saved {}", photo.display());
//! session.dispose();
//! # Ok::<(), camera_session::SessionError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod session;
pub mod storage;
mod sync;

// Re-export commonly used types
pub use backends::camera::platform_capabilities;
pub use backends::camera::types::{CameraFrame, PixelLayout, PlatformCapabilities, Resolution};
pub use config::{CameraConfig, Config, ResolutionPreset, SessionSettings};
pub use constants::BitratePreset;
pub use errors::{ConfigError, SessionError, SessionResult};
pub use session::{CameraSession, Completion, SessionEvent, SessionRegistry, SessionState};
