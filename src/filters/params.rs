// SPDX-License-Identifier: GPL-3.0-only

//! Parameter descriptors and clamping policy
//!
//! Every tunable value in the chain (built-in stage parameters and effect
//! file parameters) is described by a [`ParameterDescriptor`]. Setting a value
//! outside the descriptor range clamps it; non-finite values are rejected.

use crate::errors::{SdkError, SdkResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameter values by name, ordered for stable serialization
pub type ParamMap = BTreeMap<String, f32>;

/// How a parameter value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    /// Continuous value within [min, max]
    #[default]
    Float,
    /// On/off switch stored as 0.0 or 1.0
    Toggle,
}

/// Schema for a single tunable parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(default)]
    pub kind: ParameterKind,
    pub default: f32,
    pub min: f32,
    pub max: f32,
    /// Effect pass the parameter drives (effect parameters only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<u32>,
}

impl ParameterDescriptor {
    /// Float descriptor with a default and inclusive range
    pub fn float(name: &str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Float,
            default,
            min,
            max,
            pass: None,
        }
    }

    /// Toggle descriptor (range 0..1)
    pub fn toggle(name: &str, default: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Toggle,
            default: if default { 1.0 } else { 0.0 },
            min: 0.0,
            max: 1.0,
            pass: None,
        }
    }

    /// Apply the clamping policy to a requested value
    pub fn clamp(&self, value: f32) -> SdkResult<f32> {
        if !value.is_finite() {
            return Err(SdkError::InvalidParameter(format!(
                "{} must be finite, got {}",
                self.name, value
            )));
        }
        let clamped = value.clamp(self.min, self.max);
        Ok(match self.kind {
            ParameterKind::Float => clamped,
            ParameterKind::Toggle => clamped.round(),
        })
    }

    /// Check that the descriptor itself is well formed
    pub fn validate(&self) -> Result<(), String> {
        if !(self.min.is_finite() && self.max.is_finite() && self.default.is_finite()) {
            return Err(format!("parameter '{}' has non-finite bounds", self.name));
        }
        if self.min > self.max {
            return Err(format!(
                "parameter '{}' has min {} above max {}",
                self.name, self.min, self.max
            ));
        }
        if self.default < self.min || self.default > self.max {
            return Err(format!(
                "parameter '{}' default {} outside [{}, {}]",
                self.name, self.default, self.min, self.max
            ));
        }
        Ok(())
    }
}

/// Default values for a descriptor set
pub fn defaults(descriptors: &[ParameterDescriptor]) -> ParamMap {
    descriptors
        .iter()
        .map(|d| (d.name.clone(), d.default))
        .collect()
}

/// Look up a value, falling back to the descriptor default
pub fn value_or_default(params: &ParamMap, descriptors: &[ParameterDescriptor], name: &str) -> f32 {
    params.get(name).copied().unwrap_or_else(|| {
        descriptors
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.default)
            .unwrap_or(0.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps_out_of_range() {
        let d = ParameterDescriptor::float("contrast", 1.0, 0.0, 4.0);
        assert_eq!(d.clamp(5.0).unwrap(), 4.0);
        assert_eq!(d.clamp(-1.0).unwrap(), 0.0);
        assert_eq!(d.clamp(2.5).unwrap(), 2.5);
    }

    #[test]
    fn test_rejects_non_finite() {
        let d = ParameterDescriptor::float("brightness", 0.0, -1.0, 1.0);
        assert!(d.clamp(f32::NAN).is_err());
        assert!(d.clamp(f32::INFINITY).is_err());
    }

    #[test]
    fn test_toggle_rounds() {
        let d = ParameterDescriptor::toggle("enabled", false);
        assert_eq!(d.clamp(0.7).unwrap(), 1.0);
        assert_eq!(d.clamp(0.2).unwrap(), 0.0);
    }

    #[test]
    fn test_validate_default_outside_range() {
        let d = ParameterDescriptor::float("x", 3.0, 0.0, 1.0);
        assert!(d.validate().is_err());
    }
}
