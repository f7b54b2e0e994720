// SPDX-License-Identifier: MPL-2.0

//! External collaborators of a camera session
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                CameraSession                 │
//! └──────────┬─────────────────────┬────────────┘
//!            │                     │
//! ┌──────────┴──────────┐ ┌────────┴───────────┐
//! │       Camera        │ │      Display       │
//! │  CaptureSource +    │ │  TextureRegistrar  │
//! │  FrameSink          │ │                    │
//! └─────────────────────┘ └────────────────────┘
//! ```
//!
//! - [`camera`]: capture source contract, frame types, producer loop helper
//! - [`display`]: host texture registration

pub mod camera;
pub mod display;
