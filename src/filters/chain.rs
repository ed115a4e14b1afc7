// SPDX-License-Identifier: GPL-3.0-only

//! Ordered, mutable filter chain
//!
//! The chain is published as an immutable [`ChainState`] snapshot behind an
//! [`ArcSwap`]. Mutators clone the current snapshot under a writer lock,
//! modify the clone and swap it in, so `apply` on the processing thread never
//! blocks and always sees either the old or the new chain in full.

use super::builtin::{BuiltInKind, apply_built_in};
use super::effect::{EffectInfo, LoadedEffect};
use super::face::FaceInfo;
use super::params::{self, ParamMap};
use crate::errors::{EffectError, SdkError, SdkResult};
use crate::media::{Frame, convert};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Handle to a built-in stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageHandle(pub u64);

/// Handle to a loaded effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainHandle(pub u64);

/// A built-in stage in the chain
#[derive(Debug, Clone)]
pub struct FilterStage {
    pub handle: StageHandle,
    pub kind: BuiltInKind,
    pub params: ParamMap,
    pub enabled: bool,
}

impl FilterStage {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Enabled and not at its identity parameters
    pub fn is_active(&self) -> bool {
        self.enabled && !self.kind.is_noop(&self.params)
    }
}

/// Immutable snapshot of the chain configuration
#[derive(Debug, Clone)]
pub struct ChainState {
    stages: Vec<FilterStage>,
    effect: Option<(ChainHandle, Arc<LoadedEffect>)>,
    effects_enabled: bool,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            effect: None,
            effects_enabled: true,
        }
    }
}

impl ChainState {
    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn effect(&self) -> Option<&Arc<LoadedEffect>> {
        self.effect.as_ref().map(|(_, effect)| effect)
    }

    pub fn effects_enabled(&self) -> bool {
        self.effects_enabled
    }

    /// Whether `apply` would return the input unchanged
    pub fn is_identity(&self) -> bool {
        if !self.effects_enabled {
            return true;
        }
        let effect_idle = self.effect().is_none_or(|e| e.is_noop());
        effect_idle && !self.stages.iter().any(FilterStage::is_active)
    }

    /// Whether any active stage needs face landmarks
    pub fn requires_faces(&self) -> bool {
        self.effects_enabled
            && self
                .stages
                .iter()
                .any(|s| s.is_active() && s.kind.requires_faces())
    }

    fn stage_mut(&mut self, kind: BuiltInKind) -> Option<&mut FilterStage> {
        self.stages.iter_mut().find(|s| s.kind == kind)
    }
}

/// An active stage or effect, as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveEffect {
    pub name: String,
    /// "built-in" or "effect"
    pub origin: &'static str,
    pub parameters: ParamMap,
}

/// Serializable chain configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfiguration {
    pub effects_enabled: bool,
    pub stages: Vec<StageConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<EffectConfiguration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfiguration {
    pub name: String,
    pub enabled: bool,
    pub parameters: ParamMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectConfiguration {
    pub path: PathBuf,
    pub parameters: ParamMap,
}

/// The filter chain
pub struct FilterChain {
    state: ArcSwap<ChainState>,
    writer: Mutex<()>,
    next_handle: AtomicU64,
    beauty_licensed: AtomicBool,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(ChainState::default()),
            writer: Mutex::new(()),
            next_handle: AtomicU64::new(1),
            beauty_licensed: AtomicBool::new(false),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<ChainState> {
        self.state.load_full()
    }

    /// Allow or forbid beauty (skin, face, makeup) stages
    pub fn set_beauty_licensed(&self, licensed: bool) {
        self.beauty_licensed.store(licensed, Ordering::Release);
    }

    /// Clone the snapshot, let `f` modify it, publish the result
    fn update<R>(&self, f: impl FnOnce(&mut ChainState) -> R) -> R {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = ChainState::clone(&self.state.load());
        let result = f(&mut next);
        self.state.store(Arc::new(next));
        result
    }

    fn try_update<R>(&self, f: impl FnOnce(&mut ChainState) -> SdkResult<R>) -> SdkResult<R> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = ChainState::clone(&self.state.load());
        let result = f(&mut next)?;
        self.state.store(Arc::new(next));
        Ok(result)
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Append a built-in stage, or update it in place if already present
    ///
    /// Parameters not given keep their current (or default) values. Values
    /// are clamped to the documented ranges.
    pub fn append_built_in(&self, name: &str, values: &ParamMap) -> SdkResult<StageHandle> {
        let kind = BuiltInKind::from_name(name)
            .ok_or_else(|| EffectError::UnknownBuiltIn(name.to_string()))?;
        if kind.requires_beauty() && !self.beauty_licensed.load(Ordering::Acquire) {
            return Err(SdkError::FeatureNotEnabled(format!("beauty ({})", kind.name())));
        }

        let descriptors = kind.descriptors();
        let mut clamped = ParamMap::new();
        for (param, value) in values {
            let descriptor = descriptors.iter().find(|d| &d.name == param).ok_or_else(|| {
                SdkError::InvalidParameter(format!("{} has no parameter '{}'", kind.name(), param))
            })?;
            clamped.insert(param.clone(), descriptor.clamp(*value)?);
        }

        let fresh = StageHandle(self.next_handle());
        let handle = self.update(|state| match state.stage_mut(kind) {
            Some(stage) => {
                stage.params.extend(clamped);
                stage.enabled = true;
                stage.handle
            }
            None => {
                let mut params = params::defaults(&descriptors);
                params.extend(clamped);
                state.stages.push(FilterStage {
                    handle: fresh,
                    kind,
                    params,
                    enabled: true,
                });
                fresh
            }
        });

        debug!(stage = kind.name(), handle = handle.0, "Built-in stage applied");
        Ok(handle)
    }

    /// Remove a built-in stage by name
    pub fn remove_by_name(&self, name: &str) -> bool {
        let Some(kind) = BuiltInKind::from_name(name) else {
            return false;
        };
        self.update(|state| {
            let before = state.stages.len();
            state.stages.retain(|s| s.kind != kind);
            before != state.stages.len()
        })
    }

    /// Remove every built-in stage (the loaded effect stays)
    pub fn remove_all(&self) {
        self.update(|state| state.stages.clear());
        debug!("Removed all built-in stages");
    }

    /// Enable or disable a built-in stage without removing it
    pub fn set_stage_enabled(&self, name: &str, enabled: bool) -> bool {
        let Some(kind) = BuiltInKind::from_name(name) else {
            return false;
        };
        self.update(|state| match state.stage_mut(kind) {
            Some(stage) => {
                stage.enabled = enabled;
                true
            }
            None => false,
        })
    }

    /// Load an effect file and make it the active effect
    pub fn load_effect_file(&self, path: &Path) -> SdkResult<ChainHandle> {
        let effect = LoadedEffect::load(path)?;
        Ok(self.install_effect(effect))
    }

    /// Load an effect file on the blocking pool; resolves once installed
    pub async fn load_effect_file_async(&self, path: &Path) -> SdkResult<ChainHandle> {
        let owned = path.to_path_buf();
        let effect = tokio::task::spawn_blocking(move || LoadedEffect::load(&owned))
            .await
            .map_err(|e| EffectError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })??;
        Ok(self.install_effect(effect))
    }

    /// Replace the active effect with an already parsed one
    pub fn install_effect(&self, effect: LoadedEffect) -> ChainHandle {
        let handle = ChainHandle(self.next_handle());
        info!(
            effect = effect.name(),
            version = effect.version(),
            passes = effect.passes().len(),
            "Effect loaded"
        );
        self.update(|state| state.effect = Some((handle, Arc::new(effect))));
        handle
    }

    /// Unload the active effect; built-in stages are untouched
    pub fn unload_effect(&self) -> bool {
        self.update(|state| state.effect.take().is_some())
    }

    /// Metadata of the active effect
    pub fn effect_info(&self) -> Option<EffectInfo> {
        self.snapshot().effect().map(|e| e.info())
    }

    /// Set a parameter, returning whether it was accepted
    ///
    /// `"Stage.param"` addresses a built-in stage, a bare name addresses the
    /// loaded effect.
    pub fn set_parameter(&self, name: &str, value: f32) -> bool {
        match self.try_set_parameter(name, value) {
            Ok(_) => true,
            Err(e) => {
                debug!(parameter = name, error = %e, "Parameter rejected");
                false
            }
        }
    }

    /// Set a parameter, returning the stored (clamped) value
    pub fn try_set_parameter(&self, name: &str, value: f32) -> SdkResult<f32> {
        match name.split_once('.') {
            Some((stage_name, param)) => {
                let kind = BuiltInKind::from_name(stage_name)
                    .ok_or_else(|| EffectError::UnknownBuiltIn(stage_name.to_string()))?;
                let descriptors = kind.descriptors();
                let descriptor = descriptors.iter().find(|d| d.name == param).ok_or_else(|| {
                    SdkError::InvalidParameter(format!("{} has no parameter '{}'", kind.name(), param))
                })?;
                let value = descriptor.clamp(value)?;
                self.try_update(|state| {
                    let stage = state.stage_mut(kind).ok_or_else(|| {
                        SdkError::ResourceNotFound(format!("stage {} not in chain", kind.name()))
                    })?;
                    stage.params.insert(param.to_string(), value);
                    Ok(value)
                })
            }
            None => self.try_update(|state| {
                let (_, effect) = state
                    .effect
                    .as_mut()
                    .ok_or_else(|| SdkError::ResourceNotFound("no effect loaded".to_string()))?;
                Arc::make_mut(effect).set_parameter(name, value)
            }),
        }
    }

    /// Current value of a parameter, 0.0 when unknown
    pub fn get_parameter(&self, name: &str) -> f32 {
        let state = self.snapshot();
        match name.split_once('.') {
            Some((stage_name, param)) => BuiltInKind::from_name(stage_name)
                .and_then(|kind| state.stages.iter().find(|s| s.kind == kind))
                .and_then(|stage| stage.params.get(param).copied())
                .unwrap_or(0.0),
            None => state
                .effect()
                .and_then(|e| e.get_parameter(name))
                .unwrap_or(0.0),
        }
    }

    /// Bypass (false) or re-enable (true) the whole chain
    pub fn set_effects_enabled(&self, enabled: bool) {
        self.update(|state| state.effects_enabled = enabled);
    }

    pub fn effects_enabled(&self) -> bool {
        self.snapshot().effects_enabled
    }

    /// Reset every stage and effect parameter to its default
    pub fn reset_to_defaults(&self) {
        self.update(|state| {
            for stage in &mut state.stages {
                stage.params = params::defaults(&stage.kind.descriptors());
            }
            if let Some((_, effect)) = state.effect.as_mut() {
                Arc::make_mut(effect).reset_to_defaults();
            }
        });
        debug!("Chain parameters reset to defaults");
    }

    /// Restore the HSB stage to identity
    pub fn reset_hsb(&self) {
        self.update(|state| {
            if let Some(stage) = state.stage_mut(BuiltInKind::Hsb) {
                stage.params = params::defaults(&BuiltInKind::Hsb.descriptors());
            }
        });
    }

    /// Adjust the HSB stage relative to its current values
    ///
    /// Hue is added, saturation and brightness multiply. A missing stage
    /// starts from identity.
    pub fn adjust_hsb(&self, hue: f32, saturation: f32, brightness: f32) -> SdkResult<StageHandle> {
        let kind = BuiltInKind::Hsb;
        let descriptors = kind.descriptors();
        let fresh = StageHandle(self.next_handle());

        // Read and write under one writer lock so concurrent adjustments compose
        let handle = self.try_update(|state| {
            let stage = match state.stages.iter().position(|s| s.kind == kind) {
                Some(index) => &mut state.stages[index],
                None => {
                    state.stages.push(FilterStage {
                        handle: fresh,
                        kind,
                        params: params::defaults(&descriptors),
                        enabled: true,
                    });
                    let last = state.stages.len() - 1;
                    &mut state.stages[last]
                }
            };

            let current = |name: &str, identity: f32| stage.params.get(name).copied().unwrap_or(identity);
            let targets = [
                ("hue", current("hue", 0.0) + hue),
                ("saturation", current("saturation", 1.0) * saturation),
                ("brightness", current("brightness", 1.0) * brightness),
            ];
            for (name, target) in targets {
                let descriptor = descriptors.iter().find(|d| d.name == name).ok_or_else(|| {
                    SdkError::InvalidParameter(format!("{} has no parameter '{}'", kind.name(), name))
                })?;
                stage.params.insert(name.to_string(), descriptor.clamp(target)?);
            }
            stage.enabled = true;
            Ok(stage.handle)
        })?;

        debug!(stage = kind.name(), handle = handle.0, "HSB adjusted");
        Ok(handle)
    }

    /// Active stages and effect with their current values
    pub fn active_effects(&self) -> Vec<ActiveEffect> {
        let state = self.snapshot();
        let mut active = Vec::new();
        if let Some(effect) = state.effect() {
            active.push(ActiveEffect {
                name: effect.name().to_string(),
                origin: "effect",
                parameters: effect.parameter_values(),
            });
        }
        active.extend(state.stages.iter().filter(|s| s.is_active()).map(|s| ActiveEffect {
            name: s.name().to_string(),
            origin: "built-in",
            parameters: s.params.clone(),
        }));
        active
    }

    /// Export the chain configuration
    pub fn save_configuration(&self) -> ChainConfiguration {
        let state = self.snapshot();
        ChainConfiguration {
            effects_enabled: state.effects_enabled,
            stages: state
                .stages
                .iter()
                .map(|s| StageConfiguration {
                    name: s.name().to_string(),
                    enabled: s.enabled,
                    parameters: s.params.clone(),
                })
                .collect(),
            effect: state.effect().and_then(|e| {
                e.source().map(|path| EffectConfiguration {
                    path: path.to_path_buf(),
                    parameters: e.parameter_values(),
                })
            }),
        }
    }

    /// Replace the chain with a previously saved configuration
    ///
    /// The new chain is built off to the side and published in one swap; on
    /// error the current chain is left untouched.
    pub fn restore_configuration(&self, config: &ChainConfiguration) -> SdkResult<()> {
        let staging = FilterChain::new();
        staging.set_beauty_licensed(self.beauty_licensed.load(Ordering::Acquire));
        for stage in &config.stages {
            staging.append_built_in(&stage.name, &stage.parameters)?;
            staging.set_stage_enabled(&stage.name, stage.enabled);
        }
        if let Some(effect) = &config.effect {
            staging.load_effect_file(&effect.path)?;
            for (name, value) in &effect.parameters {
                staging.try_set_parameter(name, *value)?;
            }
        }
        staging.set_effects_enabled(config.effects_enabled);

        let mut restored = ChainState::clone(&staging.state.load());
        // Keep handles unique across the chain's lifetime
        for stage in &mut restored.stages {
            stage.handle = StageHandle(self.next_handle());
        }
        if let Some((handle, _)) = restored.effect.as_mut() {
            *handle = ChainHandle(self.next_handle());
        }
        self.update(|state| *state = restored);
        info!(stages = config.stages.len(), "Chain configuration restored");
        Ok(())
    }

    /// Run the chain over a frame
    ///
    /// Effect passes run first, then built-in stages in insertion order. An
    /// identity chain returns the input frame itself. `cancel` is checked
    /// between passes.
    pub fn apply(&self, frame: &Frame, faces: &[FaceInfo], cancel: &AtomicBool) -> SdkResult<Frame> {
        let state = self.snapshot();
        if state.is_identity() {
            return Ok(frame.clone());
        }

        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let cancelled = || cancel.load(Ordering::Relaxed);
        let mut rgba = convert::to_rgba(frame);

        if let Some(effect) = state.effect() {
            effect.apply(&mut rgba, width, height, faces, &cancelled)?;
        }

        for stage in state.stages.iter().filter(|s| s.is_active()) {
            if cancelled() {
                return Err(EffectError::Cancelled.into());
            }
            if stage.kind.requires_faces() && faces.is_empty() {
                continue;
            }
            apply_built_in(stage.kind, &stage.params, &mut rgba, width, height, faces);
        }

        if cancelled() {
            warn!("Frame processing cancelled after last pass");
            return Err(EffectError::Cancelled.into());
        }

        convert::from_rgba(&rgba, frame.width(), frame.height(), frame.format(), frame.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::face::Rect;
    use crate::media::PixelFormat;
    use std::time::Duration;

    fn values(pairs: &[(&str, f32)]) -> ParamMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn gray_frame() -> Frame {
        Frame::from_rgba(2, 2, vec![100u8; 16], Duration::from_millis(5)).unwrap()
    }

    #[test]
    fn test_append_updates_existing_stage() {
        let chain = FilterChain::new();
        let a = chain.append_built_in("ContrastFilter", &values(&[("contrast", 1.5)])).unwrap();
        let b = chain.append_built_in("ContrastFilter", &values(&[("contrast", 2.0)])).unwrap();
        assert_eq!(a, b);
        assert_eq!(chain.snapshot().stages().len(), 1);
        assert_eq!(chain.get_parameter("ContrastFilter.contrast"), 2.0);
    }

    #[test]
    fn test_values_are_clamped() {
        let chain = FilterChain::new();
        chain.append_built_in("HSBFilter", &values(&[("hue", 720.0)])).unwrap();
        assert_eq!(chain.get_parameter("HSBFilter.hue"), 360.0);
        assert!(chain.set_parameter("HSBFilter.saturation", 5.0));
        assert_eq!(chain.get_parameter("HSBFilter.saturation"), 2.0);
        assert!(!chain.set_parameter("HSBFilter.saturation", f32::NAN));
    }

    #[test]
    fn test_adjust_hsb_concurrent_adjustments_compose() {
        let chain = FilterChain::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        chain.adjust_hsb(1.0, 1.0, 1.0).unwrap();
                    }
                });
            }
        });
        assert_eq!(chain.get_parameter("HSBFilter.hue"), 200.0);
        assert_eq!(chain.snapshot().stages.len(), 1);
    }

    #[test]
    fn test_adjust_hsb_accumulates() {
        let chain = FilterChain::new();
        chain.adjust_hsb(30.0, 1.5, 0.5).unwrap();
        chain.adjust_hsb(30.0, 1.2, 2.0).unwrap();
        assert_eq!(chain.get_parameter("HSBFilter.hue"), 60.0);
        assert!((chain.get_parameter("HSBFilter.saturation") - 1.8).abs() < 1e-5);
        assert_eq!(chain.get_parameter("HSBFilter.brightness"), 1.0);

        chain.reset_hsb();
        assert_eq!(chain.get_parameter("HSBFilter.hue"), 0.0);
        assert_eq!(chain.get_parameter("HSBFilter.saturation"), 1.0);
    }

    #[test]
    fn test_beauty_requires_licence() {
        let chain = FilterChain::new();
        let err = chain
            .append_built_in("SkinSmoothingFilter", &values(&[("level", 0.5)]))
            .unwrap_err();
        assert!(matches!(err, SdkError::FeatureNotEnabled(_)));

        chain.set_beauty_licensed(true);
        assert!(chain.append_built_in("SkinSmoothingFilter", &values(&[("level", 0.5)])).is_ok());
    }

    #[test]
    fn test_unknown_names() {
        let chain = FilterChain::new();
        assert!(chain.append_built_in("Hologram", &ParamMap::new()).is_err());
        assert!(!chain.remove_by_name("Hologram"));
        assert_eq!(chain.get_parameter("nothing"), 0.0);
        assert_eq!(chain.get_parameter("Hologram.level"), 0.0);
    }

    #[test]
    fn test_identity_chain_returns_same_payload() {
        let chain = FilterChain::new();
        chain.append_built_in("BrightnessFilter", &values(&[("brightness", 0.0)])).unwrap();
        let frame = gray_frame();
        let out = chain.apply(&frame, &[], &AtomicBool::new(false)).unwrap();
        assert!(Arc::ptr_eq(&frame.shared_data(), &out.shared_data()));
    }

    #[test]
    fn test_disabled_chain_is_bypassed() {
        let chain = FilterChain::new();
        chain.append_built_in("GrayscaleFilter", &ParamMap::new()).unwrap();
        chain.set_effects_enabled(false);
        let frame = gray_frame();
        let out = chain.apply(&frame, &[], &AtomicBool::new(false)).unwrap();
        assert!(Arc::ptr_eq(&frame.shared_data(), &out.shared_data()));
    }

    #[test]
    fn test_apply_preserves_format_and_timestamp() {
        let chain = FilterChain::new();
        chain.append_built_in("BrightnessFilter", &values(&[("brightness", 0.1)])).unwrap();
        let frame = convert::convert(&gray_frame(), PixelFormat::Nv12).unwrap();
        let out = chain.apply(&frame, &[], &AtomicBool::new(false)).unwrap();
        assert_eq!(out.format(), PixelFormat::Nv12);
        assert_eq!(out.timestamp(), Duration::from_millis(5));
        assert!(out.data()[0] > frame.data()[0]);
    }

    #[test]
    fn test_cancelled_apply_fails() {
        let chain = FilterChain::new();
        chain.append_built_in("GrayscaleFilter", &ParamMap::new()).unwrap();
        let err = chain.apply(&gray_frame(), &[], &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, SdkError::Effect(EffectError::Cancelled)));
    }

    #[test]
    fn test_face_stage_needs_faces() {
        let chain = FilterChain::new();
        chain.set_beauty_licensed(true);
        chain.append_built_in("EyeEnlargementFilter", &values(&[("level", 1.0)])).unwrap();
        assert!(chain.snapshot().requires_faces());

        let pixels: Vec<u8> = (0..64 * 64 * 4).map(|i| (i % 251) as u8).collect();
        let frame = Frame::from_rgba(64, 64, pixels, Duration::ZERO).unwrap();
        let untouched = chain.apply(&frame, &[], &AtomicBool::new(false)).unwrap();
        assert_eq!(untouched.data(), frame.data());

        let face = FaceInfo::new(0, Rect::new(0.0, 0.0, 1.0, 1.0), 1.0);
        let warped = chain.apply(&frame, &[face], &AtomicBool::new(false)).unwrap();
        assert_ne!(warped.data(), frame.data());
    }

    #[test]
    fn test_effect_parameter_round_trip() {
        let chain = FilterChain::new();
        let effect = LoadedEffect::parse(
            br#"{ "name": "A", "passes": [{ "id": 0, "kind": "vivid" }],
                 "parameters": [{ "name": "intensity", "default": 1.0, "min": 0.0, "max": 1.0, "pass": 0 }] }"#,
            "A",
        )
        .unwrap();
        chain.install_effect(effect);
        assert!(chain.set_parameter("intensity", 0.5));
        assert_eq!(chain.get_parameter("intensity"), 0.5);
        assert!(chain.unload_effect());
        assert_eq!(chain.get_parameter("intensity"), 0.0);
    }

    #[test]
    fn test_unload_keeps_built_ins() {
        let chain = FilterChain::new();
        chain.append_built_in("GrayscaleFilter", &ParamMap::new()).unwrap();
        chain.install_effect(
            LoadedEffect::parse(br#"{ "name": "B", "passes": [{ "id": 0, "kind": "mono" }] }"#, "B")
                .unwrap(),
        );
        chain.unload_effect();
        assert_eq!(chain.snapshot().stages().len(), 1);
    }

    #[test]
    fn test_save_and_restore() {
        let chain = FilterChain::new();
        chain.append_built_in("RGBFilter", &values(&[("red", 1.5)])).unwrap();
        chain.append_built_in("GrayscaleFilter", &ParamMap::new()).unwrap();
        chain.set_stage_enabled("GrayscaleFilter", false);
        let saved = chain.save_configuration();

        chain.remove_all();
        chain.restore_configuration(&saved).unwrap();
        assert_eq!(chain.get_parameter("RGBFilter.red"), 1.5);
        assert_eq!(chain.save_configuration(), saved);
    }

    #[test]
    fn test_reset_to_defaults() {
        let chain = FilterChain::new();
        chain.append_built_in("ContrastFilter", &values(&[("contrast", 3.0)])).unwrap();
        chain.reset_to_defaults();
        assert_eq!(chain.get_parameter("ContrastFilter.contrast"), 1.0);
        assert!(chain.active_effects().is_empty());
    }
}
