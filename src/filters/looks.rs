// SPDX-License-Identifier: GPL-3.0-only

//! Stylised colour looks used as effect-file passes
//!
//! Each look computes a target colour per pixel and is blended with the input
//! by its `intensity` parameter (0 leaves the frame untouched, 1 applies the
//! look fully).

use super::builtin::smoothstep;
use super::params::{ParamMap, ParameterDescriptor, value_or_default};
use serde::{Deserialize, Serialize};

/// Look kinds addressable from effect files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookKind {
    Mono,
    Sepia,
    Noir,
    Vivid,
    Cool,
    Warm,
    Fade,
    Duotone,
    Vignette,
    Negative,
    Posterize,
    Solarize,
    ChromaticAberration,
    Pencil,
}

impl LookKind {
    pub const ALL: [LookKind; 14] = [
        LookKind::Mono,
        LookKind::Sepia,
        LookKind::Noir,
        LookKind::Vivid,
        LookKind::Cool,
        LookKind::Warm,
        LookKind::Fade,
        LookKind::Duotone,
        LookKind::Vignette,
        LookKind::Negative,
        LookKind::Posterize,
        LookKind::Solarize,
        LookKind::ChromaticAberration,
        LookKind::Pencil,
    ];

    /// Pass kind name as written in effect files
    pub fn name(&self) -> &'static str {
        match self {
            LookKind::Mono => "mono",
            LookKind::Sepia => "sepia",
            LookKind::Noir => "noir",
            LookKind::Vivid => "vivid",
            LookKind::Cool => "cool",
            LookKind::Warm => "warm",
            LookKind::Fade => "fade",
            LookKind::Duotone => "duotone",
            LookKind::Vignette => "vignette",
            LookKind::Negative => "negative",
            LookKind::Posterize => "posterize",
            LookKind::Solarize => "solarize",
            LookKind::ChromaticAberration => "chromatic_aberration",
            LookKind::Pencil => "pencil",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|look| look.name() == lower)
    }

    /// Parameter schema for the look
    pub fn descriptors(&self) -> Vec<ParameterDescriptor> {
        let mut descriptors = vec![ParameterDescriptor::float("intensity", 1.0, 0.0, 1.0)];
        match self {
            // Levels below 1 are accepted and reported as a processing fault
            LookKind::Posterize => {
                descriptors.push(ParameterDescriptor::float("levels", 4.0, 0.0, 32.0))
            }
            LookKind::Solarize => {
                descriptors.push(ParameterDescriptor::float("threshold", 0.5, 0.0, 1.0))
            }
            _ => {}
        }
        descriptors
    }
}

impl std::fmt::Display for LookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Apply a look to a tightly packed RGBA buffer in place
///
/// Fails only when the parameters cannot produce an image (posterize with
/// fewer than one level).
pub fn apply_look(
    look: LookKind,
    params: &ParamMap,
    rgba: &mut [u8],
    width: usize,
    height: usize,
) -> Result<(), String> {
    let descriptors = look.descriptors();
    let intensity = value_or_default(params, &descriptors, "intensity");
    let levels = value_or_default(params, &descriptors, "levels");
    let threshold = value_or_default(params, &descriptors, "threshold");

    if look == LookKind::Posterize && levels < 1.0 {
        return Err(format!("posterize needs at least 1 level, got {}", levels));
    }
    if intensity <= 0.0 {
        return Ok(());
    }

    // Neighbourhood looks sample the unmodified input
    let source = match look {
        LookKind::ChromaticAberration | LookKind::Pencil => Some(rgba.to_vec()),
        _ => None,
    };

    for y in 0..height {
        for x in 0..width {
            let i = (y * width + x) * 4;
            let r0 = rgba[i] as f32 / 255.0;
            let g0 = rgba[i + 1] as f32 / 255.0;
            let b0 = rgba[i + 2] as f32 / 255.0;
            let (mut r, mut g, mut b) = (r0, g0, b0);

            match (&source, look) {
                (Some(src), LookKind::ChromaticAberration) => {
                    (r, g, b) = chromatic_aberration(src, width, height, x, y);
                }
                (Some(src), LookKind::Pencil) => {
                    let v = pencil(src, width, height, x, y);
                    (r, g, b) = (v, v, v);
                }
                _ => look_rgb(&mut r, &mut g, &mut b, look, levels, threshold, x, y, width, height),
            }

            rgba[i] = blend(r0, r, intensity);
            rgba[i + 1] = blend(g0, g, intensity);
            rgba[i + 2] = blend(b0, b, intensity);
        }
    }

    Ok(())
}

#[inline]
fn blend(from: f32, to: f32, t: f32) -> u8 {
    ((from + (to - from) * t).clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
fn luminance(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Per-pixel colour transform for the looks that need no neighbours
#[allow(clippy::too_many_arguments)]
#[inline]
fn look_rgb(
    r: &mut f32,
    g: &mut f32,
    b: &mut f32,
    look: LookKind,
    levels: f32,
    threshold: f32,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) {
    match look {
        LookKind::Mono => {
            let gray = luminance(*r, *g, *b);
            (*r, *g, *b) = (gray, gray, gray);
        }

        LookKind::Sepia => {
            let l = luminance(*r, *g, *b);
            *r = (l * 1.2 + 0.1).clamp(0.0, 1.0);
            *g = (l * 0.9 + 0.05).clamp(0.0, 1.0);
            *b = (l * 0.7).clamp(0.0, 1.0);
        }

        LookKind::Noir => {
            let l = luminance(*r, *g, *b);
            let adjusted = ((l - 0.5) * 2.0 + 0.5).clamp(0.0, 1.0);
            (*r, *g, *b) = (adjusted, adjusted, adjusted);
        }

        LookKind::Vivid => {
            let l = luminance(*r, *g, *b);
            for c in [&mut *r, &mut *g, &mut *b] {
                let saturated = (l + (*c - l) * 1.4).clamp(0.0, 1.0);
                *c = ((saturated - 0.5) * 1.15 + 0.5).clamp(0.0, 1.0);
            }
        }

        LookKind::Cool => {
            *r = (*r * 0.9).clamp(0.0, 1.0);
            *g = (*g * 0.95).clamp(0.0, 1.0);
            *b = (*b * 1.1).clamp(0.0, 1.0);
        }

        LookKind::Warm => {
            *r = (*r * 1.1).clamp(0.0, 1.0);
            *b = (*b * 0.85).clamp(0.0, 1.0);
        }

        LookKind::Fade => {
            for c in [&mut *r, &mut *g, &mut *b] {
                *c = (*c * 0.85 + 0.1).clamp(0.0, 1.0);
            }
            let l = luminance(*r, *g, *b);
            for c in [&mut *r, &mut *g, &mut *b] {
                *c = (l + (*c - l) * 0.7).clamp(0.0, 1.0);
            }
        }

        LookKind::Duotone => {
            let l = luminance(*r, *g, *b);
            let dark = (0.1, 0.1, 0.4);
            let light = (1.0, 0.9, 0.5);
            *r = dark.0 + l * (light.0 - dark.0);
            *g = dark.1 + l * (light.1 - dark.1);
            *b = dark.2 + l * (light.2 - dark.2);
        }

        LookKind::Vignette => {
            let dx = x as f32 / width as f32 - 0.5;
            let dy = y as f32 / height as f32 - 0.5;
            let dist = (dx * dx + dy * dy).sqrt();
            let vignette = 1.0 - smoothstep(0.3, 0.9, dist);
            *r *= vignette;
            *g *= vignette;
            *b *= vignette;
        }

        LookKind::Negative => {
            (*r, *g, *b) = (1.0 - *r, 1.0 - *g, 1.0 - *b);
        }

        LookKind::Posterize => {
            let levels = levels.floor();
            for c in [&mut *r, &mut *g, &mut *b] {
                *c = ((*c * levels).floor() / levels).min(1.0);
            }
        }

        LookKind::Solarize => {
            for c in [&mut *r, &mut *g, &mut *b] {
                if *c > threshold {
                    *c = 1.0 - *c;
                }
            }
        }

        LookKind::ChromaticAberration | LookKind::Pencil => {}
    }
}

fn sample(src: &[u8], width: usize, height: usize, x: isize, y: isize) -> (f32, f32, f32) {
    let x = x.clamp(0, width as isize - 1) as usize;
    let y = y.clamp(0, height as isize - 1) as usize;
    let i = (y * width + x) * 4;
    (
        src[i] as f32 / 255.0,
        src[i + 1] as f32 / 255.0,
        src[i + 2] as f32 / 255.0,
    )
}

/// Red sampled to the right, blue to the left, 0.4% of the width apart
fn chromatic_aberration(src: &[u8], width: usize, height: usize, x: usize, y: usize) -> (f32, f32, f32) {
    let offset = (width as f32 * 0.004).max(1.0) as isize;
    let (x, y) = (x as isize, y as isize);
    let (_, g, _) = sample(src, width, height, x, y);
    let (r, _, _) = sample(src, width, height, x + offset, y);
    let (_, _, b) = sample(src, width, height, x - offset, y);
    (r, g, b)
}

/// Sobel edges drawn as pencil lines on textured paper
fn pencil(src: &[u8], width: usize, height: usize, px: usize, py: usize) -> f32 {
    let l = |dx: isize, dy: isize| {
        let (r, g, b) = sample(src, width, height, px as isize + dx, py as isize + dy);
        luminance(r, g, b)
    };

    let gx = -l(-1, -1) - 2.0 * l(-1, 0) - l(-1, 1) + l(1, -1) + 2.0 * l(1, 0) + l(1, 1);
    let gy = -l(-1, -1) - 2.0 * l(0, -1) - l(1, -1) + l(-1, 1) + 2.0 * l(0, 1) + l(1, 1);
    let edge = (gx * gx + gy * gy).sqrt();

    let hash = ((px as f32 * 127.1 + py as f32 * 311.7) * 0.01).sin() * 43758.5453;
    let paper = 0.95 + hash.fract().abs() * 0.05;
    ((1.0 - edge * 2.0) * paper).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, f32)]) -> ParamMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_zero_intensity_is_identity() {
        let original: Vec<u8> = (0..64u8).map(|v| v * 3).collect();
        for look in LookKind::ALL {
            let mut rgba = original.clone();
            apply_look(look, &params(&[("intensity", 0.0)]), &mut rgba, 4, 4).unwrap();
            assert_eq!(rgba, original, "{look}");
        }
    }

    #[test]
    fn test_half_intensity_blends() {
        let mut rgba = vec![200, 200, 200, 255];
        apply_look(LookKind::Negative, &params(&[("intensity", 0.5)]), &mut rgba, 1, 1).unwrap();
        // 200/255 blended halfway towards 55/255
        assert!((rgba[0] as i32 - 128).abs() <= 1);
        assert_eq!(rgba[3], 255);
    }

    #[test]
    fn test_posterize_rejects_zero_levels() {
        let mut rgba = vec![10, 20, 30, 255];
        let result = apply_look(LookKind::Posterize, &params(&[("levels", 0.0)]), &mut rgba, 1, 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_mono_equalizes_channels() {
        let mut rgba = vec![255, 0, 0, 255];
        apply_look(LookKind::Mono, &ParamMap::new(), &mut rgba, 1, 1).unwrap();
        assert_eq!(rgba[0], rgba[1]);
        assert_eq!(rgba[1], rgba[2]);
    }

    #[test]
    fn test_names_round_trip() {
        for look in LookKind::ALL {
            assert_eq!(LookKind::from_name(look.name()), Some(look));
        }
    }
}
