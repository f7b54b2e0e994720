// SPDX-License-Identifier: MPL-2.0

//! Frame consumers fed by the session's producer thread
//!
//! ```text
//!                      ┌───────────────────┐
//!                 ┌──▶ │  FrameSlotRing    │ ──▶ display render loop
//!                 │    └───────────────────┘
//! ┌────────────┐  │    ┌───────────────────┐
//! │  producer  │ ─┼──▶ │  StreamChannel    │ ──▶ doorbell / queued messages
//! │   thread   │  │    └───────────────────┘
//! └────────────┘  │    ┌───────────────────┐
//!                 └──▶ │  RecordingBranch  │ ──▶ writer thread ──▶ file
//!                      └───────────────────┘
//! ```
//!
//! Every frame visits the three sinks in this order. Photo capture works
//! from the session's latest-frame snapshot instead of the live feed.

pub mod photo;
pub mod preview;
pub mod stream;
pub mod video;
