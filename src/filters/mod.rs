// SPDX-License-Identifier: GPL-3.0-only

//! Filter chain
//!
//! The chain holds any number of built-in parametric stages plus at most one
//! loaded effect. Effect passes run first, followed by built-in stages in
//! insertion order. All stages operate on a private RGBA working buffer; the
//! result is converted back to the input frame's format.
//!
//! # Parameter policy
//!
//! Out-of-range values are clamped to the descriptor range, non-finite values
//! are rejected and toggle parameters round to 0 or 1.
//!
//! # Modules
//!
//! - [`params`]: Parameter descriptors and clamping
//! - [`builtin`]: Built-in colour, beauty and face filters
//! - [`looks`]: Stylised looks available to effect files
//! - [`effect`]: Effect file parsing and validation
//! - [`face`]: Face detection collaborator types
//! - [`chain`]: The chain itself

pub mod builtin;
pub mod chain;
pub mod effect;
pub mod face;
pub mod looks;
pub mod params;

pub use builtin::BuiltInKind;
pub use chain::{
    ActiveEffect, ChainConfiguration, ChainHandle, ChainState, FilterChain, FilterStage,
    StageHandle,
};
pub use effect::{EffectInfo, LoadedEffect, get_filter_info};
pub use face::{FaceDetector, FaceInfo, FaceLandmarks, Point, Rect, StaticFaceDetector};
pub use looks::LookKind;
pub use params::{ParamMap, ParameterDescriptor, ParameterKind};
