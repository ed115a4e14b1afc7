// SPDX-License-Identifier: GPL-3.0-only

//! Video recording
//!
//! - [`recorder`]: Recording sink state machine and limits
//! - [`muxer`]: Y4M video container with a WAV audio sidecar

pub mod muxer;
pub mod recorder;

pub use muxer::{MuxOutput, Muxer, Y4mMuxer};
pub use recorder::{AppendOutcome, RecordingOptions, RecordingSink, RecordingState};
