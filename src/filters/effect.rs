// SPDX-License-Identifier: GPL-3.0-only

//! Effect files
//!
//! An effect file (`*.fx.json`) packages an ordered list of passes plus the
//! user-facing parameters that drive them:
//!
//! ```json
//! {
//!   "name": "Golden Hour",
//!   "version": "1.0",
//!   "passes": [
//!     { "id": 0, "kind": "warm", "params": { "intensity": 0.8 } },
//!     { "id": 1, "kind": "ContrastFilter", "params": { "contrast": 1.2 } }
//!   ],
//!   "parameters": [
//!     { "name": "intensity", "default": 0.8, "min": 0.0, "max": 1.0, "pass": 0 }
//!   ]
//! }
//! ```
//!
//! Pass kinds are the built-in colour filters (by stage name) and the looks
//! in [`LookKind`]. Each parameter drives the pass parameter of the same
//! name unless `target` names another one.

use super::builtin::{BuiltInKind, apply_built_in};
use super::face::FaceInfo;
use super::looks::{LookKind, apply_look};
use super::params::{ParamMap, ParameterDescriptor, ParameterKind};
use crate::errors::{EffectError, SdkError, SdkResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct EffectFile {
    name: String,
    #[serde(default = "default_version")]
    version: String,
    passes: Vec<PassSpec>,
    #[serde(default)]
    parameters: Vec<ParameterSpec>,
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Deserialize)]
struct PassSpec {
    id: u32,
    kind: String,
    #[serde(default)]
    params: ParamMap,
}

#[derive(Debug, Deserialize)]
struct ParameterSpec {
    name: String,
    #[serde(default)]
    kind: ParameterKind,
    default: f32,
    min: f32,
    max: f32,
    pass: u32,
    #[serde(default)]
    target: Option<String>,
}

/// What a pass does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    BuiltIn(BuiltInKind),
    Look(LookKind),
}

impl PassKind {
    fn parse(kind: &str) -> Option<Self> {
        if let Some(look) = LookKind::from_name(kind) {
            return Some(PassKind::Look(look));
        }
        BuiltInKind::from_name(kind)
            .filter(|b| !b.requires_beauty())
            .map(PassKind::BuiltIn)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PassKind::BuiltIn(b) => b.name(),
            PassKind::Look(l) => l.name(),
        }
    }

    fn descriptors(&self) -> Vec<ParameterDescriptor> {
        match self {
            PassKind::BuiltIn(b) => b.descriptors(),
            PassKind::Look(l) => l.descriptors(),
        }
    }
}

/// One pass of a loaded effect
#[derive(Debug, Clone)]
pub struct EffectPass {
    pub id: u32,
    pub kind: PassKind,
    pub params: ParamMap,
}

impl EffectPass {
    /// Whether the pass leaves every pixel unchanged with its current values
    fn is_noop(&self) -> bool {
        match self.kind {
            PassKind::BuiltIn(b) => b.is_noop(&self.params),
            PassKind::Look(_) => self.params.get("intensity").copied().unwrap_or(1.0) <= 0.0,
        }
    }

    fn apply(&self, rgba: &mut [u8], width: usize, height: usize, faces: &[FaceInfo]) -> SdkResult<()> {
        match self.kind {
            PassKind::BuiltIn(b) => {
                apply_built_in(b, &self.params, rgba, width, height, faces);
                Ok(())
            }
            PassKind::Look(l) => apply_look(l, &self.params, rgba, width, height).map_err(|reason| {
                EffectError::PassFault {
                    pass: format!("{}#{}", l.name(), self.id),
                    reason,
                }
                .into()
            }),
        }
    }
}

/// A user-facing effect parameter bound to a pass
#[derive(Debug, Clone)]
pub struct EffectParameter {
    pub descriptor: ParameterDescriptor,
    /// Parameter name inside the bound pass
    pub target: String,
}

/// Effect metadata, as returned without installing the effect
#[derive(Debug, Clone, Serialize)]
pub struct EffectInfo {
    pub name: String,
    pub version: String,
    pub passes: Vec<String>,
    pub parameters: Vec<ParameterDescriptor>,
}

/// A parsed and validated effect
#[derive(Debug, Clone)]
pub struct LoadedEffect {
    name: String,
    version: String,
    source: Option<PathBuf>,
    passes: Vec<EffectPass>,
    parameters: Vec<EffectParameter>,
}

impl LoadedEffect {
    /// Read and validate an effect file
    pub fn load(path: &Path) -> SdkResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                SdkError::ResourceNotFound(format!("effect file {}", path.display()))
            }
            _ => load_failed(path.display(), e),
        })?;
        let mut effect = Self::parse(&bytes, &path.display().to_string())?;
        effect.source = Some(path.to_path_buf());
        Ok(effect)
    }

    /// Parse and validate an effect from its JSON payload
    ///
    /// `label` names the payload in error messages.
    pub fn parse(bytes: &[u8], label: &str) -> SdkResult<Self> {
        let file: EffectFile = serde_json::from_slice(bytes).map_err(|e| load_failed(label, e))?;

        if file.passes.is_empty() {
            return Err(load_failed(label, "effect has no passes"));
        }

        let mut passes = Vec::with_capacity(file.passes.len());
        for spec in file.passes {
            let kind = PassKind::parse(&spec.kind)
                .ok_or_else(|| EffectError::UnknownPassKind(spec.kind.clone()))?;
            if passes.iter().any(|p: &EffectPass| p.id == spec.id) {
                return Err(load_failed(label, format!("duplicate pass id {}", spec.id)));
            }

            let descriptors = kind.descriptors();
            let mut params = super::params::defaults(&descriptors);
            for (name, value) in spec.params {
                let descriptor = descriptors.iter().find(|d| d.name == name).ok_or_else(|| {
                    load_failed(label, format!("pass {} has no parameter '{}'", spec.id, name))
                })?;
                params.insert(name, descriptor.clamp(value)?);
            }

            passes.push(EffectPass {
                id: spec.id,
                kind,
                params,
            });
        }

        let mut parameters: Vec<EffectParameter> = Vec::with_capacity(file.parameters.len());
        for spec in file.parameters {
            let descriptor = ParameterDescriptor {
                name: spec.name.clone(),
                kind: spec.kind,
                default: spec.default,
                min: spec.min,
                max: spec.max,
                pass: Some(spec.pass),
            };
            descriptor.validate().map_err(|reason| load_failed(label, reason))?;

            if parameters.iter().any(|p| p.descriptor.name == spec.name) {
                return Err(load_failed(label, format!("duplicate parameter '{}'", spec.name)));
            }

            let target = spec.target.unwrap_or_else(|| spec.name.clone());
            let pass = passes
                .iter_mut()
                .find(|p| p.id == spec.pass)
                .ok_or_else(|| EffectError::InvalidBinding {
                    parameter: spec.name.clone(),
                    pass: spec.pass,
                })?;
            if !pass.kind.descriptors().iter().any(|d| d.name == target) {
                return Err(load_failed(
                    label,
                    format!("pass {} has no parameter '{}'", spec.pass, target),
                ));
            }
            pass.params.insert(target.clone(), descriptor.default);

            parameters.push(EffectParameter { descriptor, target });
        }

        debug!(
            name = %file.name,
            passes = passes.len(),
            parameters = parameters.len(),
            "Parsed effect"
        );

        Ok(Self {
            name: file.name,
            version: file.version,
            source: None,
            passes,
            parameters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// File the effect was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn passes(&self) -> &[EffectPass] {
        &self.passes
    }

    pub fn parameters(&self) -> &[EffectParameter] {
        &self.parameters
    }

    pub fn info(&self) -> EffectInfo {
        EffectInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            passes: self.passes.iter().map(|p| p.kind.name().to_string()).collect(),
            parameters: self.parameters.iter().map(|p| p.descriptor.clone()).collect(),
        }
    }

    /// Set a user-facing parameter, returning the stored (clamped) value
    pub fn set_parameter(&mut self, name: &str, value: f32) -> SdkResult<f32> {
        let param = self
            .parameters
            .iter()
            .find(|p| p.descriptor.name == name)
            .ok_or_else(|| SdkError::InvalidParameter(format!("effect has no parameter '{}'", name)))?;
        let value = param.descriptor.clamp(value)?;
        let pass_id = param.descriptor.pass;
        let target = param.target.clone();

        if let Some(pass) = self.passes.iter_mut().find(|p| Some(p.id) == pass_id) {
            pass.params.insert(target, value);
        }
        Ok(value)
    }

    /// Current value of a user-facing parameter
    pub fn get_parameter(&self, name: &str) -> Option<f32> {
        let param = self.parameters.iter().find(|p| p.descriptor.name == name)?;
        self.passes
            .iter()
            .find(|p| Some(p.id) == param.descriptor.pass)
            .and_then(|p| p.params.get(&param.target).copied())
    }

    /// Values of all user-facing parameters
    pub fn parameter_values(&self) -> ParamMap {
        self.parameters
            .iter()
            .filter_map(|p| {
                self.get_parameter(&p.descriptor.name)
                    .map(|v| (p.descriptor.name.clone(), v))
            })
            .collect()
    }

    /// Restore every user-facing parameter to its default
    pub fn reset_to_defaults(&mut self) {
        let defaults: Vec<(String, f32)> = self
            .parameters
            .iter()
            .map(|p| (p.descriptor.name.clone(), p.descriptor.default))
            .collect();
        for (name, value) in defaults {
            // Defaults were validated against the range at load time
            let _ = self.set_parameter(&name, value);
        }
    }

    /// Whether every pass is currently a no-op
    pub fn is_noop(&self) -> bool {
        self.passes.iter().all(EffectPass::is_noop)
    }

    /// Run every pass in order over the RGBA working buffer
    pub(crate) fn apply(
        &self,
        rgba: &mut [u8],
        width: usize,
        height: usize,
        faces: &[FaceInfo],
        cancelled: &dyn Fn() -> bool,
    ) -> SdkResult<()> {
        for pass in self.passes.iter().filter(|p| !p.is_noop()) {
            if cancelled() {
                return Err(EffectError::Cancelled.into());
            }
            pass.apply(rgba, width, height, faces)?;
        }
        Ok(())
    }
}

fn load_failed(label: impl std::fmt::Display, reason: impl std::fmt::Display) -> SdkError {
    EffectError::LoadFailed {
        path: label.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Read effect metadata without installing it
pub fn get_filter_info(path: &Path) -> SdkResult<EffectInfo> {
    LoadedEffect::load(path).map(|effect| effect.info())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;

    const EFFECT_A: &str = r#"{
        "name": "A",
        "passes": [
            { "id": 0, "kind": "sepia" },
            { "id": 1, "kind": "ContrastFilter", "params": { "contrast": 1.5 } }
        ],
        "parameters": [
            { "name": "intensity", "default": 1.0, "min": 0.0, "max": 1.0, "pass": 0 },
            { "name": "punch", "default": 1.5, "min": 0.0, "max": 4.0, "pass": 1, "target": "contrast" }
        ]
    }"#;

    #[test]
    fn test_parse_and_set_parameter() {
        let mut effect = LoadedEffect::parse(EFFECT_A.as_bytes(), "A").unwrap();
        assert_eq!(effect.name(), "A");
        assert_eq!(effect.get_parameter("intensity"), Some(1.0));

        assert_eq!(effect.set_parameter("intensity", 0.5).unwrap(), 0.5);
        assert_eq!(effect.get_parameter("intensity"), Some(0.5));

        assert_eq!(effect.set_parameter("punch", 9.0).unwrap(), 4.0);
        assert_eq!(effect.passes()[1].params["contrast"], 4.0);
    }

    #[test]
    fn test_reset_to_defaults() {
        let mut effect = LoadedEffect::parse(EFFECT_A.as_bytes(), "A").unwrap();
        effect.set_parameter("intensity", 0.1).unwrap();
        effect.reset_to_defaults();
        assert_eq!(effect.get_parameter("intensity"), Some(1.0));
    }

    #[test]
    fn test_unknown_pass_kind() {
        let json = r#"{ "name": "x", "passes": [{ "id": 0, "kind": "hologram" }] }"#;
        let err = LoadedEffect::parse(json.as_bytes(), "x").unwrap_err();
        assert!(matches!(err, SdkError::Effect(EffectError::UnknownPassKind(_))));
        assert_eq!(err.code(), ErrorCode::EffectLoadFailed);
    }

    #[test]
    fn test_binding_to_missing_pass() {
        let json = r#"{
            "name": "x",
            "passes": [{ "id": 0, "kind": "mono" }],
            "parameters": [{ "name": "intensity", "default": 1.0, "min": 0.0, "max": 1.0, "pass": 7 }]
        }"#;
        let err = LoadedEffect::parse(json.as_bytes(), "x").unwrap_err();
        assert!(matches!(
            err,
            SdkError::Effect(EffectError::InvalidBinding { pass: 7, .. })
        ));
    }

    #[test]
    fn test_default_outside_range() {
        let json = r#"{
            "name": "x",
            "passes": [{ "id": 0, "kind": "mono" }],
            "parameters": [{ "name": "intensity", "default": 2.0, "min": 0.0, "max": 1.0, "pass": 0 }]
        }"#;
        let err = LoadedEffect::parse(json.as_bytes(), "x").unwrap_err();
        assert_eq!(err.code(), ErrorCode::EffectLoadFailed);
    }

    #[test]
    fn test_invalid_json() {
        let err = LoadedEffect::parse(b"{ not json", "broken").unwrap_err();
        assert_eq!(err.code(), ErrorCode::EffectLoadFailed);
    }

    #[test]
    fn test_beauty_kinds_not_allowed_as_passes() {
        let json = r#"{ "name": "x", "passes": [{ "id": 0, "kind": "FaceSlimmingFilter" }] }"#;
        assert!(LoadedEffect::parse(json.as_bytes(), "x").is_err());
    }

    #[test]
    fn test_missing_file_is_resource_not_found() {
        let err = LoadedEffect::load(Path::new("/nonexistent/effect.fx.json")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResourceNotFound);
    }
}
