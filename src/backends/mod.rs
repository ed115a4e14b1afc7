// SPDX-License-Identifier: GPL-3.0-only

//! Input sources and arbitration
//!
//! Every producer of raw frames implements [`FrameSource`]. The
//! [`InputArbiter`] owns the registered sources and guarantees that at most
//! one of them is initializing or active at any instant.
//!
//! ```text
//! ┌────────┐ ┌──────────────┐ ┌────────────┐ ┌───────┐
//! │ Camera │ │ External data│ │ Video file │ │ Image │
//! └───┬────┘ └──────┬───────┘ └─────┬──────┘ └───┬───┘
//!     └─────────────┴───────┬───────┴────────────┘
//!                           ▼
//!                  ┌─────────────────┐
//!                  │  InputArbiter   │  ← conflict strategy, single active
//!                  └────────┬────────┘
//!                           ▼
//!                   processing loop
//! ```
//!
//! # Modules
//!
//! - [`arbiter`]: Conflict strategies and per-source state machine
//! - [`camera`]: Camera provider collaborator and the test-pattern camera
//! - [`external`]: Injection queue for caller-supplied frames
//! - [`file_source`]: Still image and Y4M video file sources

pub mod arbiter;
pub mod camera;
pub mod external;
pub mod file_source;

pub use arbiter::{ConflictStrategy, InputArbiter, RequestOutcome, SharedSource, SourceEvent};
pub use camera::{CameraProvider, CameraSource, SharedCamera, TestPatternCamera};
pub use external::{ExternalFrameData, ExternalFrameInjector, ExternalFrameSource};
pub use file_source::{ImageSource, VideoFileSource};

use crate::errors::SdkResult;
use crate::media::Frame;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of input source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputSourceKind {
    Camera,
    ExternalData,
    VideoFile,
    Image,
}

impl InputSourceKind {
    pub const ALL: [InputSourceKind; 4] = [
        InputSourceKind::Camera,
        InputSourceKind::ExternalData,
        InputSourceKind::VideoFile,
        InputSourceKind::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InputSourceKind::Camera => "camera",
            InputSourceKind::ExternalData => "external-data",
            InputSourceKind::VideoFile => "video-file",
            InputSourceKind::Image => "image",
        }
    }
}

impl std::fmt::Display for InputSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of an input source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputState {
    #[default]
    Inactive,
    Initializing,
    Active,
    Paused,
    Error,
}

impl InputState {
    /// Whether the source holds the single active slot
    pub fn holds_slot(&self) -> bool {
        matches!(self, InputState::Initializing | InputState::Active)
    }
}

/// A producer of raw frames
///
/// Sources are driven by the processing thread through `next_frame`; the
/// arbiter drives the lifecycle calls.
pub trait FrameSource: Send {
    /// Kind reported in source-change notifications
    fn kind(&self) -> InputSourceKind;

    /// Acquire resources and begin producing frames
    fn start(&mut self) -> SdkResult<()>;

    /// Release resources; pending frames are discarded
    fn stop(&mut self);

    /// Suspend frame production without releasing resources
    fn pause(&mut self) {}

    /// Continue after `pause`
    fn resume(&mut self) -> SdkResult<()> {
        Ok(())
    }

    /// Wait up to `timeout` for the next frame
    ///
    /// Returns `Ok(None)` when no frame arrived in time.
    fn next_frame(&mut self, timeout: Duration) -> SdkResult<Option<Frame>>;

    /// Whether the source has produced everything it ever will
    fn is_exhausted(&self) -> bool {
        false
    }
}
