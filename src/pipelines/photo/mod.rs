// SPDX-License-Identifier: MPL-2.0

//! Still photo encoding
//!
//! ```text
//! latest frame snapshot ─▶ PhotoEncoder::encode ─▶ save_frame ─▶ file
//! ```
//!
//! The session runs this on a background thread with its own reference to
//! the snapshot, so disposal can proceed while a photo is being written.

pub mod encoding;

pub use encoding::{JpegPhotoEncoder, PhotoEncoder, save_frame};
