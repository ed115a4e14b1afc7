// SPDX-License-Identifier: GPL-3.0-only

//! Frame processing pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────────┐
//! │ Input source │ ──▶ │ Processing engine │ ──▶ │ Preview / output │
//! │ camera, data │     │  - face detection │     │ callbacks        │
//! │ image, video │     │  - filter chain   │     ├──────────────────┤
//! └──────────────┘     │  - metrics        │ ──▶ │ Recording sink   │
//!                      └───────────────────┘     └──────────────────┘
//! ```
//!
//! The processing loop never waits for a sink: callback lanes drop frames
//! when they fall behind, the recording lane keeps every frame in order.
//!
//! # Modules
//!
//! - [`engine`]: Processing loop, lifecycle state and source arbitration
//! - [`events`]: Event broadcast to observers
//! - [`frame_loop`]: Named worker threads with cooperative stop
//! - [`license`]: License validation
//! - [`metrics`]: Throughput and latency tracking
//! - [`sinks`]: Output callback lanes and the recording lane
//! - [`photo`]: Photo encoding and saving
//! - [`video`]: Recording sink and container writer

pub mod engine;
pub mod events;
pub mod frame_loop;
pub mod license;
pub mod metrics;
pub mod photo;
pub mod sinks;
pub mod video;

pub use engine::{ProcessingEngine, ProcessingMode, SdkState};
pub use events::{EventBus, SdkEvent};
pub use metrics::ProcessingMetrics;
