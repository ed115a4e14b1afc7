// SPDX-License-Identifier: GPL-3.0-only

//! lumafx - real-time frame filter pipeline
//!
//! Frames from exactly one active input source run through an ordered,
//! mutable filter chain and fan out to preview, callback and recording
//! sinks.
//!
//! # Architecture
//!
//! - [`media`]: Frame buffers, pixel formats and conversions
//! - [`filters`]: Filter chain, built-in filters and effect files
//! - [`backends`]: Input sources and their arbitration
//! - [`pipelines`]: Processing engine, sinks, recording and photos
//! - [`cloud`]: Cloud filter delivery and the effect cache
//! - [`sdk`]: The process-wide context tying it all together
//! - [`config`]: Persisted SDK configuration
//! - [`storage`]: Output file locations
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> lumafx::SdkResult<()> {
//! use lumafx::{FilterSdk, SdkConfig};
//!
//! let sdk = FilterSdk::new(SdkConfig::with_api_key("demo"))?;
//! sdk.initialize().await?;
//! sdk.apply_brightness_filter(0.2)?;
//! sdk.start_processing()?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod cloud;
pub mod config;
pub mod constants;
pub mod errors;
pub mod filters;
pub mod media;
pub mod pipelines;
pub mod sdk;
pub mod storage;

pub use backends::{ConflictStrategy, InputSourceKind, InputState};
pub use config::SdkConfig;
pub use errors::{ErrorCode, SdkError, SdkResult};
pub use media::{Frame, PixelFormat};
pub use pipelines::{ProcessingMode, SdkEvent, SdkState};
pub use sdk::FilterSdk;
