// SPDX-License-Identifier: GPL-3.0-only

//! Frame and sample buffer abstraction
//!
//! Every source produces [`Frame`] values and every sink consumes them. A
//! frame is immutable once built: filter stages work on a private RGBA
//! working buffer and produce a new frame.
//!
//! # Color Space Conversion
//!
//! The [`convert`] module converts between the supported pixel formats using
//! BT.601 full-range math. Same-format conversion is a passthrough that
//! shares the payload.
//!
//! # Modules
//!
//! - [`frame`]: Pixel formats, geometry validation and the `Frame` type
//! - [`convert`]: Format conversion, mirroring and scaling
//! - [`audio`]: Interleaved PCM sample buffers for recording

pub mod audio;
pub mod convert;
pub mod frame;

pub use audio::AudioBuffer;
pub use frame::{Frame, PixelFormat};
