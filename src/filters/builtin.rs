// SPDX-License-Identifier: GPL-3.0-only

//! Built-in parametric filters
//!
//! Each built-in runs on the chain's RGBA working buffer. At their default
//! parameter values all built-ins except grayscale are the identity, which
//! lets the chain skip them entirely.

use super::face::{FaceInfo, Point};
use super::params::{ParamMap, ParameterDescriptor, value_or_default};
use crate::media::convert::rgb_to_yuv;
use serde::{Deserialize, Serialize};

/// Built-in filter kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltInKind {
    Rgb,
    Brightness,
    Contrast,
    Hsb,
    Hue,
    Grayscale,
    WhiteBalance,
    Sharpen,
    SkinSmoothing,
    SkinWhitening,
    FaceSlimming,
    EyeEnlargement,
    NoseSize,
    Lipstick,
    Blusher,
}

impl BuiltInKind {
    pub const ALL: [BuiltInKind; 15] = [
        BuiltInKind::Rgb,
        BuiltInKind::Brightness,
        BuiltInKind::Contrast,
        BuiltInKind::Hsb,
        BuiltInKind::Hue,
        BuiltInKind::Grayscale,
        BuiltInKind::WhiteBalance,
        BuiltInKind::Sharpen,
        BuiltInKind::SkinSmoothing,
        BuiltInKind::SkinWhitening,
        BuiltInKind::FaceSlimming,
        BuiltInKind::EyeEnlargement,
        BuiltInKind::NoseSize,
        BuiltInKind::Lipstick,
        BuiltInKind::Blusher,
    ];

    /// Stage name used to address the filter
    pub fn name(&self) -> &'static str {
        match self {
            BuiltInKind::Rgb => "RGBFilter",
            BuiltInKind::Brightness => "BrightnessFilter",
            BuiltInKind::Contrast => "ContrastFilter",
            BuiltInKind::Hsb => "HSBFilter",
            BuiltInKind::Hue => "HueFilter",
            BuiltInKind::Grayscale => "GrayscaleFilter",
            BuiltInKind::WhiteBalance => "WhiteBalanceFilter",
            BuiltInKind::Sharpen => "SharpenFilter",
            BuiltInKind::SkinSmoothing => "SkinSmoothingFilter",
            BuiltInKind::SkinWhitening => "SkinWhiteningFilter",
            BuiltInKind::FaceSlimming => "FaceSlimmingFilter",
            BuiltInKind::EyeEnlargement => "EyeEnlargementFilter",
            BuiltInKind::NoseSize => "NoseSizeFilter",
            BuiltInKind::Lipstick => "LipstickFilter",
            BuiltInKind::Blusher => "BlusherFilter",
        }
    }

    /// Resolve a stage name (case-insensitive, "Filter" suffix optional)
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let bare = lower.strip_suffix("filter").unwrap_or(&lower);
        Self::ALL.into_iter().find(|kind| {
            let candidate = kind.name().to_ascii_lowercase();
            candidate.strip_suffix("filter").unwrap_or(&candidate) == bare
        })
    }

    /// Parameter schema for the filter
    pub fn descriptors(&self) -> Vec<ParameterDescriptor> {
        use ParameterDescriptor as P;
        match self {
            BuiltInKind::Rgb => vec![
                P::float("red", 1.0, 0.0, 2.0),
                P::float("green", 1.0, 0.0, 2.0),
                P::float("blue", 1.0, 0.0, 2.0),
            ],
            BuiltInKind::Brightness => vec![P::float("brightness", 0.0, -1.0, 1.0)],
            BuiltInKind::Contrast => vec![P::float("contrast", 1.0, 0.0, 4.0)],
            BuiltInKind::Hsb => vec![
                P::float("hue", 0.0, -360.0, 360.0),
                P::float("saturation", 1.0, 0.0, 2.0),
                P::float("brightness", 1.0, 0.0, 2.0),
            ],
            BuiltInKind::Hue => vec![P::float("hue", 0.0, 0.0, 360.0)],
            BuiltInKind::Grayscale => Vec::new(),
            BuiltInKind::WhiteBalance => vec![
                P::float("temperature", 6500.0, 2000.0, 12000.0),
                P::float("tint", 0.0, -200.0, 200.0),
            ],
            BuiltInKind::NoseSize => vec![P::float("level", 50.0, 0.0, 100.0)],
            BuiltInKind::Sharpen
            | BuiltInKind::SkinSmoothing
            | BuiltInKind::SkinWhitening
            | BuiltInKind::FaceSlimming
            | BuiltInKind::EyeEnlargement
            | BuiltInKind::Lipstick
            | BuiltInKind::Blusher => vec![P::float("level", 0.0, 0.0, 1.0)],
        }
    }

    /// Skin, face and makeup filters need the licence `beauty` feature
    pub fn requires_beauty(&self) -> bool {
        matches!(
            self,
            BuiltInKind::SkinSmoothing
                | BuiltInKind::SkinWhitening
                | BuiltInKind::FaceSlimming
                | BuiltInKind::EyeEnlargement
                | BuiltInKind::NoseSize
                | BuiltInKind::Lipstick
                | BuiltInKind::Blusher
        )
    }

    /// Filters that need face landmarks to do anything
    pub fn requires_faces(&self) -> bool {
        matches!(
            self,
            BuiltInKind::FaceSlimming
                | BuiltInKind::EyeEnlargement
                | BuiltInKind::NoseSize
                | BuiltInKind::Lipstick
                | BuiltInKind::Blusher
        )
    }

    /// Whether the parameters leave every pixel unchanged
    pub fn is_noop(&self, params: &ParamMap) -> bool {
        if *self == BuiltInKind::Grayscale {
            return false;
        }
        let descriptors = self.descriptors();
        descriptors
            .iter()
            .all(|d| value_or_default(params, &descriptors, &d.name) == d.default)
    }
}

impl std::fmt::Display for BuiltInKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Apply a built-in filter to a tightly packed RGBA buffer in place
pub fn apply_built_in(
    kind: BuiltInKind,
    params: &ParamMap,
    rgba: &mut [u8],
    width: usize,
    height: usize,
    faces: &[FaceInfo],
) {
    let descriptors = kind.descriptors();
    let p = |name: &str| value_or_default(params, &descriptors, name);

    match kind {
        BuiltInKind::Rgb => {
            let (kr, kg, kb) = (p("red"), p("green"), p("blue"));
            map_pixels(rgba, |r, g, b| (r * kr, g * kg, b * kb));
        }
        BuiltInKind::Brightness => {
            let delta = p("brightness");
            map_pixels(rgba, |r, g, b| (r + delta, g + delta, b + delta));
        }
        BuiltInKind::Contrast => {
            let k = p("contrast");
            map_pixels(rgba, |r, g, b| {
                ((r - 0.5) * k + 0.5, (g - 0.5) * k + 0.5, (b - 0.5) * k + 0.5)
            });
        }
        BuiltInKind::Hsb => {
            let (dh, ks, kv) = (p("hue"), p("saturation"), p("brightness"));
            map_pixels(rgba, |r, g, b| {
                let (h, s, v) = rgb_to_hsv(r, g, b);
                hsv_to_rgb(h + dh, s * ks, v * kv)
            });
        }
        BuiltInKind::Hue => {
            let dh = p("hue");
            map_pixels(rgba, |r, g, b| {
                let (h, s, v) = rgb_to_hsv(r, g, b);
                hsv_to_rgb(h + dh, s, v)
            });
        }
        BuiltInKind::Grayscale => {
            map_pixels(rgba, |r, g, b| {
                let gray = 0.299 * r + 0.587 * g + 0.114 * b;
                (gray, gray, gray)
            });
        }
        BuiltInKind::WhiteBalance => {
            // Higher temperature warms the image, positive tint shifts to magenta
            let warmth = ((p("temperature") - 6500.0) / 5500.0).clamp(-1.0, 1.0);
            let tint = p("tint") / 200.0;
            let (kr, kg, kb) = (1.0 + 0.2 * warmth, 1.0 - 0.1 * tint, 1.0 - 0.2 * warmth);
            map_pixels(rgba, |r, g, b| (r * kr, g * kg, b * kb));
        }
        BuiltInKind::Sharpen => {
            let level = p("level") * 2.0;
            let blurred = box_blur(rgba, width, height, 1);
            for (px, bl) in rgba.chunks_exact_mut(4).zip(blurred.chunks_exact(4)) {
                for c in 0..3 {
                    let v = px[c] as f32 + level * (px[c] as f32 - bl[c] as f32);
                    px[c] = v.clamp(0.0, 255.0).round() as u8;
                }
            }
        }
        BuiltInKind::SkinSmoothing => {
            let level = p("level");
            let blurred = box_blur(rgba, width, height, 2);
            for (px, bl) in rgba.chunks_exact_mut(4).zip(blurred.chunks_exact(4)) {
                let weight = level * skin_likelihood(px);
                for c in 0..3 {
                    let v = px[c] as f32 + (bl[c] as f32 - px[c] as f32) * weight;
                    px[c] = v.clamp(0.0, 255.0).round() as u8;
                }
            }
        }
        BuiltInKind::SkinWhitening => {
            let level = p("level") * 0.35;
            for px in rgba.chunks_exact_mut(4) {
                let weight = level * skin_likelihood(px);
                for c in 0..3 {
                    let v = px[c] as f32 + (255.0 - px[c] as f32) * weight;
                    px[c] = v.clamp(0.0, 255.0).round() as u8;
                }
            }
        }
        BuiltInKind::FaceSlimming => {
            let level = p("level");
            for face in faces {
                slim_face(rgba, width, height, face, level);
            }
        }
        BuiltInKind::EyeEnlargement => {
            let level = p("level") * 0.35;
            for face in faces {
                let lm = face.landmarks_or_estimate();
                let radius = face.bounding_box.width * 0.18;
                for eye in [lm.left_eye, lm.right_eye] {
                    bulge(rgba, width, height, eye, radius, level);
                }
            }
        }
        BuiltInKind::NoseSize => {
            // 50 is neutral, lower shrinks and higher enlarges
            let strength = (p("level") - 50.0) / 50.0 * 0.3;
            for face in faces {
                let lm = face.landmarks_or_estimate();
                let radius = face.bounding_box.width * 0.16;
                bulge(rgba, width, height, lm.nose, radius, strength);
            }
        }
        BuiltInKind::Lipstick => {
            let level = p("level") * 0.6;
            for face in faces {
                let lm = face.landmarks_or_estimate();
                let rx = face.bounding_box.width * 0.18;
                let ry = face.bounding_box.height * 0.06;
                tint_ellipse(rgba, width, height, lm.mouth, rx, ry, [0.75, 0.08, 0.2], level);
            }
        }
        BuiltInKind::Blusher => {
            let level = p("level") * 0.4;
            for face in faces {
                let lm = face.landmarks_or_estimate();
                let rx = face.bounding_box.width * 0.12;
                let ry = face.bounding_box.height * 0.08;
                for cheek in [lm.left_cheek, lm.right_cheek] {
                    tint_ellipse(rgba, width, height, cheek, rx, ry, [0.95, 0.45, 0.5], level);
                }
            }
        }
    }
}

/// Run a per-pixel colour function over the RGBA buffer (alpha untouched)
pub(crate) fn map_pixels(rgba: &mut [u8], f: impl Fn(f32, f32, f32) -> (f32, f32, f32)) {
    for px in rgba.chunks_exact_mut(4) {
        let (r, g, b) = f(
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
        );
        px[0] = (r.clamp(0.0, 1.0) * 255.0).round() as u8;
        px[1] = (g.clamp(0.0, 1.0) * 255.0).round() as u8;
        px[2] = (b.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
}

/// Hue in degrees, saturation and value in 0..1
fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let sat = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (hue, sat, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let h = h.rem_euclid(360.0);
    let s = s.clamp(0.0, 1.0);
    let v = v.clamp(0.0, 1.0);
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    (r + m, g + m, b + m)
}

/// Likelihood (0..1) that a pixel is skin, from its chroma in YCbCr space
fn skin_likelihood(px: &[u8]) -> f32 {
    let (_, u, v) = rgb_to_yuv(
        px[0] as f32 / 255.0,
        px[1] as f32 / 255.0,
        px[2] as f32 / 255.0,
    );
    let cb = (u + 0.5) * 255.0;
    let cr = (v + 0.5) * 255.0;
    // Classic skin cluster Cb 77..127, Cr 133..173, softened at the edges
    let in_cb = 1.0 - ((cb - 102.0).abs() - 25.0).max(0.0) / 10.0;
    let in_cr = 1.0 - ((cr - 153.0).abs() - 20.0).max(0.0) / 10.0;
    in_cb.clamp(0.0, 1.0) * in_cr.clamp(0.0, 1.0)
}

/// Separable box blur with the given radius
fn box_blur(rgba: &[u8], width: usize, height: usize, radius: usize) -> Vec<u8> {
    let mut horizontal = vec![0u8; rgba.len()];
    for y in 0..height {
        for x in 0..width {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(width - 1);
            let mut sum = [0u32; 4];
            for sx in lo..=hi {
                let i = (y * width + sx) * 4;
                for c in 0..4 {
                    sum[c] += rgba[i + c] as u32;
                }
            }
            let n = (hi - lo + 1) as u32;
            let o = (y * width + x) * 4;
            for c in 0..4 {
                horizontal[o + c] = (sum[c] / n) as u8;
            }
        }
    }

    let mut out = vec![0u8; rgba.len()];
    for y in 0..height {
        let lo = y.saturating_sub(radius);
        let hi = (y + radius).min(height - 1);
        for x in 0..width {
            let mut sum = [0u32; 4];
            for sy in lo..=hi {
                let i = (sy * width + x) * 4;
                for c in 0..4 {
                    sum[c] += horizontal[i + c] as u32;
                }
            }
            let n = (hi - lo + 1) as u32;
            let o = (y * width + x) * 4;
            for c in 0..4 {
                out[o + c] = (sum[c] / n) as u8;
            }
        }
    }
    out
}

/// Radial magnify (positive strength) or pinch (negative) around a point
fn bulge(rgba: &mut [u8], width: usize, height: usize, center: Point, radius: f32, strength: f32) {
    if strength == 0.0 || radius <= 0.0 {
        return;
    }
    let src = rgba.to_vec();
    let cx = center.x * width as f32;
    let cy = center.y * height as f32;
    let r = radius * width as f32;
    let (x0, x1) = pixel_span(cx - r, cx + r, width);
    let (y0, y1) = pixel_span(cy - r, cy + r, height);

    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let dist = (dx * dx + dy * dy).sqrt() / r;
            if dist >= 1.0 {
                continue;
            }
            let scale = 1.0 - strength * (1.0 - dist * dist);
            copy_pixel(&src, rgba, width, height, cx + dx * scale, cy + dy * scale, x, y);
        }
    }
}

/// Pull the lower half of the face horizontally towards its centre line
fn slim_face(rgba: &mut [u8], width: usize, height: usize, face: &FaceInfo, level: f32) {
    if level == 0.0 {
        return;
    }
    let src = rgba.to_vec();
    let b = face.bounding_box;
    let center = b.center();
    let cx = center.x * width as f32;
    let half_w = b.width * width as f32 * 0.6;
    let top = (b.y + b.height * 0.45) * height as f32;
    let bottom = (b.y + b.height) * height as f32;
    let (x0, x1) = pixel_span(cx - half_w, cx + half_w, width);
    let (y0, y1) = pixel_span(top, bottom, height);

    for y in y0..y1 {
        let vertical = ((y as f32 - top) / (bottom - top).max(1.0)).clamp(0.0, 1.0);
        for x in x0..x1 {
            let dx = x as f32 - cx;
            let horizontal = 1.0 - (dx.abs() / half_w).powi(2);
            let push = 1.0 + level * 0.15 * vertical * horizontal.max(0.0);
            copy_pixel(&src, rgba, width, height, cx + dx * push, y as f32, x, y);
        }
    }
}

/// Blend a colour into an elliptical region with a soft edge
#[allow(clippy::too_many_arguments)]
fn tint_ellipse(
    rgba: &mut [u8],
    width: usize,
    height: usize,
    center: Point,
    rx: f32,
    ry: f32,
    color: [f32; 3],
    level: f32,
) {
    if level == 0.0 {
        return;
    }
    let cx = center.x * width as f32;
    let cy = center.y * height as f32;
    let rx = (rx * width as f32).max(1.0);
    let ry = (ry * height as f32).max(1.0);
    let (x0, x1) = pixel_span(cx - rx, cx + rx, width);
    let (y0, y1) = pixel_span(cy - ry, cy + ry, height);

    for y in y0..y1 {
        for x in x0..x1 {
            let nx = (x as f32 - cx) / rx;
            let ny = (y as f32 - cy) / ry;
            let d = nx * nx + ny * ny;
            if d >= 1.0 {
                continue;
            }
            let alpha = level * (1.0 - smoothstep(0.5, 1.0, d));
            let i = (y * width + x) * 4;
            // Keep the underlying shading so the colour reads as makeup
            let (luma, _, _) = rgb_to_yuv(
                rgba[i] as f32 / 255.0,
                rgba[i + 1] as f32 / 255.0,
                rgba[i + 2] as f32 / 255.0,
            );
            for c in 0..3 {
                let v = rgba[i + c] as f32 / 255.0;
                let target = color[c] * (0.5 + luma);
                rgba[i + c] = ((v + (target - v) * alpha).clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        }
    }
}

fn pixel_span(lo: f32, hi: f32, limit: usize) -> (usize, usize) {
    let lo = lo.floor().max(0.0) as usize;
    let hi = (hi.ceil().max(0.0) as usize).min(limit);
    (lo.min(limit), hi)
}

#[allow(clippy::too_many_arguments)]
#[inline]
fn copy_pixel(src: &[u8], dst: &mut [u8], width: usize, height: usize, sx: f32, sy: f32, x: usize, y: usize) {
    let sx = (sx.round().max(0.0) as usize).min(width - 1);
    let sy = (sy.round().max(0.0) as usize).min(height - 1);
    let s = (sy * width + sx) * 4;
    let d = (y * width + x) * 4;
    dst[d..d + 4].copy_from_slice(&src[s..s + 4]);
}

/// Smoothstep function for soft edges
#[inline]
pub(crate) fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::face::Rect;
    use crate::filters::params::defaults;

    fn solid(px: [u8; 4], n: usize) -> Vec<u8> {
        px.iter().copied().cycle().take(n * 4).collect()
    }

    fn params(pairs: &[(&str, f32)]) -> ParamMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_name_lookup_is_lenient() {
        assert_eq!(BuiltInKind::from_name("ContrastFilter"), Some(BuiltInKind::Contrast));
        assert_eq!(BuiltInKind::from_name("contrast"), Some(BuiltInKind::Contrast));
        assert_eq!(BuiltInKind::from_name("HSB"), Some(BuiltInKind::Hsb));
        assert_eq!(BuiltInKind::from_name("Bogus"), None);
    }

    #[test]
    fn test_defaults_are_noop() {
        for kind in BuiltInKind::ALL {
            let defaults = defaults(&kind.descriptors());
            assert_eq!(kind.is_noop(&defaults), kind != BuiltInKind::Grayscale, "{kind}");
        }
    }

    #[test]
    fn test_default_parameters_leave_pixels_unchanged() {
        let original = solid([90, 140, 200, 255], 16);
        for kind in BuiltInKind::ALL {
            if kind == BuiltInKind::Grayscale {
                continue;
            }
            let mut rgba = original.clone();
            let face = FaceInfo::new(0, Rect::new(0.0, 0.0, 1.0, 1.0), 1.0);
            apply_built_in(kind, &defaults(&kind.descriptors()), &mut rgba, 4, 4, &[face]);
            assert_eq!(rgba, original, "{kind}");
        }
    }

    #[test]
    fn test_brightness_raises_channels() {
        let mut rgba = solid([100, 100, 100, 255], 1);
        apply_built_in(BuiltInKind::Brightness, &params(&[("brightness", 0.2)]), &mut rgba, 1, 1, &[]);
        assert_eq!(rgba, vec![151, 151, 151, 255]);
    }

    #[test]
    fn test_hsb_zero_saturation_is_gray() {
        let mut rgba = solid([200, 50, 50, 255], 1);
        apply_built_in(BuiltInKind::Hsb, &params(&[("saturation", 0.0)]), &mut rgba, 1, 1, &[]);
        assert_eq!(rgba[0], rgba[1]);
        assert_eq!(rgba[1], rgba[2]);
    }

    #[test]
    fn test_face_stage_without_faces_is_noop() {
        let original: Vec<u8> = (0..64u8).collect();
        let mut rgba = original.clone();
        apply_built_in(BuiltInKind::EyeEnlargement, &params(&[("level", 1.0)]), &mut rgba, 4, 4, &[]);
        assert_eq!(rgba, original);
    }

    #[test]
    fn test_lipstick_reddens_mouth() {
        let mut rgba = solid([128, 128, 128, 255], 64 * 64);
        let face = FaceInfo::new(0, Rect::new(0.1, 0.1, 0.8, 0.8), 1.0);
        apply_built_in(BuiltInKind::Lipstick, &params(&[("level", 1.0)]), &mut rgba, 64, 64, &[face.clone()]);
        let mouth = face.landmarks_or_estimate().mouth;
        let i = ((mouth.y * 64.0) as usize * 64 + (mouth.x * 64.0) as usize) * 4;
        assert!(rgba[i] > rgba[i + 1]);
    }
}
