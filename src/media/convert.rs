// SPDX-License-Identifier: GPL-3.0-only

//! Pixel format conversion
//!
//! All filter stages run on a tightly packed RGBA working buffer. This module
//! converts any supported [`PixelFormat`] into that buffer and back, using
//! BT.601 full-range coefficients. Chroma for subsampled outputs is taken
//! from the average of each 2x2 (or 2x1 for 4:2:2) block.

use super::frame::{Frame, PixelFormat};
use crate::errors::{FrameError, SdkResult};
use image::{RgbaImage, imageops};
use std::time::Duration;
use tracing::debug;

/// YUV to RGB conversion (BT.601), inputs in 0..1 with chroma centred on 0
#[inline]
pub fn yuv_to_rgb(y: f32, u: f32, v: f32) -> (f32, f32, f32) {
    let r = (y + 1.402 * v).clamp(0.0, 1.0);
    let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 1.0);
    let b = (y + 1.772 * u).clamp(0.0, 1.0);
    (r, g, b)
}

/// RGB to YUV conversion (BT.601), chroma centred on 0
#[inline]
pub fn rgb_to_yuv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.169 * r - 0.331 * g + 0.500 * b;
    let v = 0.500 * r - 0.419 * g - 0.081 * b;
    (y, u, v)
}

#[inline]
fn unit(v: u8) -> f32 {
    v as f32 / 255.0
}

#[inline]
fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
fn chroma_byte(v: f32) -> u8 {
    to_byte(v + 0.5)
}

/// Decode a frame into a tightly packed RGBA buffer (width * height * 4 bytes)
pub fn to_rgba(frame: &Frame) -> Vec<u8> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride() as usize;
    let data = frame.data();
    let mut out = vec![0u8; width * height * 4];

    match frame.format() {
        PixelFormat::Rgba32 => {
            for row in 0..height {
                let src = &data[row * stride..row * stride + width * 4];
                out[row * width * 4..(row + 1) * width * 4].copy_from_slice(src);
            }
        }
        PixelFormat::Bgra32 => {
            for row in 0..height {
                for x in 0..width {
                    let s = row * stride + x * 4;
                    let d = (row * width + x) * 4;
                    out[d] = data[s + 2];
                    out[d + 1] = data[s + 1];
                    out[d + 2] = data[s];
                    out[d + 3] = data[s + 3];
                }
            }
        }
        PixelFormat::Rgb24 => {
            for row in 0..height {
                for x in 0..width {
                    let s = row * stride + x * 3;
                    let d = (row * width + x) * 4;
                    out[d..d + 3].copy_from_slice(&data[s..s + 3]);
                    out[d + 3] = 255;
                }
            }
        }
        PixelFormat::Grayscale => {
            for row in 0..height {
                for x in 0..width {
                    let y = data[row * stride + x];
                    let d = (row * width + x) * 4;
                    out[d..d + 4].copy_from_slice(&[y, y, y, 255]);
                }
            }
        }
        PixelFormat::Yuv422 => {
            for row in 0..height {
                for x in 0..width {
                    let pair = row * stride + (x / 2) * 4;
                    let y = data[pair + (x % 2) * 2];
                    let u = data[pair + 1];
                    let v = data[pair + 3];
                    write_yuv_pixel(&mut out, (row * width + x) * 4, y, u, v);
                }
            }
        }
        PixelFormat::Yuv420p | PixelFormat::Nv12 | PixelFormat::Nv21 => {
            let Some((first, second, chroma_stride)) = frame.chroma_planes() else {
                return out;
            };
            let format = frame.format();
            for row in 0..height {
                for x in 0..width {
                    let y = data[row * stride + x];
                    let chroma_row = (row / 2) * chroma_stride;
                    let (u, v) = match format {
                        PixelFormat::Yuv420p => (
                            data[first + chroma_row + x / 2],
                            data[second + chroma_row + x / 2],
                        ),
                        PixelFormat::Nv12 => {
                            let i = first + chroma_row + (x / 2) * 2;
                            (data[i], data[i + 1])
                        }
                        _ => {
                            let i = first + chroma_row + (x / 2) * 2;
                            (data[i + 1], data[i])
                        }
                    };
                    write_yuv_pixel(&mut out, (row * width + x) * 4, y, u, v);
                }
            }
        }
    }

    out
}

#[inline]
fn write_yuv_pixel(out: &mut [u8], idx: usize, y: u8, u: u8, v: u8) {
    let (r, g, b) = yuv_to_rgb(unit(y), unit(u) - 0.5, unit(v) - 0.5);
    out[idx] = to_byte(r);
    out[idx + 1] = to_byte(g);
    out[idx + 2] = to_byte(b);
    out[idx + 3] = 255;
}

/// Average chroma of the pixels in the block starting at (x, y)
fn block_chroma(rgba: &[u8], width: usize, height: usize, x: usize, y: usize, rows: usize) -> (u8, u8) {
    let mut u_sum = 0.0;
    let mut v_sum = 0.0;
    let mut count = 0.0;
    for by in y..(y + rows).min(height) {
        for bx in x..(x + 2).min(width) {
            let i = (by * width + bx) * 4;
            let (_, u, v) = rgb_to_yuv(unit(rgba[i]), unit(rgba[i + 1]), unit(rgba[i + 2]));
            u_sum += u;
            v_sum += v;
            count += 1.0;
        }
    }
    (chroma_byte(u_sum / count), chroma_byte(v_sum / count))
}

#[inline]
fn luma_byte(rgba: &[u8], i: usize) -> u8 {
    let (y, _, _) = rgb_to_yuv(unit(rgba[i]), unit(rgba[i + 1]), unit(rgba[i + 2]));
    to_byte(y)
}

/// Encode a tightly packed RGBA buffer as `format` with the minimum stride
pub fn from_rgba(
    rgba: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    timestamp: Duration,
) -> SdkResult<Frame> {
    let w = width as usize;
    let h = height as usize;
    let stride = format.min_stride(width);
    if rgba.len() < w * h * 4 {
        return Err(FrameError::PayloadTooShort {
            length: rgba.len(),
            expected: w * h * 4,
        }
        .into());
    }

    let out = match format {
        PixelFormat::Rgba32 => rgba[..w * h * 4].to_vec(),
        PixelFormat::Bgra32 => {
            let mut out = rgba[..w * h * 4].to_vec();
            for px in out.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
            out
        }
        PixelFormat::Rgb24 => rgba[..w * h * 4]
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect(),
        PixelFormat::Grayscale => (0..w * h).map(|p| luma_byte(rgba, p * 4)).collect(),
        PixelFormat::Yuv422 => {
            let mut out = vec![0u8; stride as usize * h];
            for y in 0..h {
                for x in (0..w).step_by(2) {
                    let (u, v) = block_chroma(rgba, w, h, x, y, 1);
                    let y0 = luma_byte(rgba, (y * w + x) * 4);
                    let y1 = if x + 1 < w {
                        luma_byte(rgba, (y * w + x + 1) * 4)
                    } else {
                        y0
                    };
                    let o = y * stride as usize + (x / 2) * 4;
                    out[o..o + 4].copy_from_slice(&[y0, u, y1, v]);
                }
            }
            out
        }
        PixelFormat::Yuv420p | PixelFormat::Nv12 | PixelFormat::Nv21 => {
            let mut out = vec![0u8; format.required_len(width, height, stride)];
            let luma_stride = stride as usize;
            let chroma_stride = format.chroma_stride(stride) as usize;
            let luma_size = luma_stride * h;
            let chroma_rows = h.div_ceil(2);
            for y in 0..h {
                for x in 0..w {
                    out[y * luma_stride + x] = luma_byte(rgba, (y * w + x) * 4);
                }
            }
            for cy in 0..chroma_rows {
                for cx in 0..w.div_ceil(2) {
                    let (u, v) = block_chroma(rgba, w, h, cx * 2, cy * 2, 2);
                    match format {
                        PixelFormat::Yuv420p => {
                            out[luma_size + cy * chroma_stride + cx] = u;
                            out[luma_size + chroma_stride * chroma_rows + cy * chroma_stride + cx] = v;
                        }
                        PixelFormat::Nv12 => {
                            let i = luma_size + cy * chroma_stride + cx * 2;
                            out[i] = u;
                            out[i + 1] = v;
                        }
                        _ => {
                            let i = luma_size + cy * chroma_stride + cx * 2;
                            out[i] = v;
                            out[i + 1] = u;
                        }
                    }
                }
            }
            out
        }
    };

    Frame::new(width, height, format, stride, timestamp, out)
}

/// Convert a frame to another format
///
/// Converting to the frame's own format returns a clone sharing the payload.
pub fn convert(frame: &Frame, format: PixelFormat) -> SdkResult<Frame> {
    if frame.format() == format {
        return Ok(frame.clone());
    }
    debug!(from = %frame.format(), to = %format, "Converting frame");
    let rgba = to_rgba(frame);
    from_rgba(&rgba, frame.width(), frame.height(), format, frame.timestamp())
}

/// Mirror an RGBA buffer horizontally in place
pub fn flip_horizontal_rgba(rgba: &mut [u8], width: usize, height: usize) {
    let Ok(pixels) = bytemuck::try_cast_slice_mut::<u8, [u8; 4]>(rgba) else {
        return;
    };
    for row in pixels.chunks_exact_mut(width).take(height) {
        row.reverse();
    }
}

/// Mirror a frame horizontally, preserving its format
pub fn mirror(frame: &Frame) -> SdkResult<Frame> {
    let mut rgba = to_rgba(frame);
    flip_horizontal_rgba(&mut rgba, frame.width() as usize, frame.height() as usize);
    from_rgba(&rgba, frame.width(), frame.height(), frame.format(), frame.timestamp())
}

/// Resize an RGBA buffer with bilinear filtering
///
/// Returns the input unchanged if the sizes already match.
pub fn scale_rgba(rgba: Vec<u8>, width: u32, height: u32, new_width: u32, new_height: u32) -> Vec<u8> {
    if width == new_width && height == new_height {
        return rgba;
    }
    match RgbaImage::from_raw(width, height, rgba) {
        Some(img) => {
            imageops::resize(&img, new_width, new_height, imageops::FilterType::Triangle)
                .into_raw()
        }
        None => vec![0u8; new_width as usize * new_height as usize * 4],
    }
}

/// Encode RGBA as tightly packed I420 (YUV420P), the layout written by the recorder
pub fn rgba_to_i420(rgba: &[u8], width: u32, height: u32) -> SdkResult<Vec<u8>> {
    let frame = from_rgba(rgba, width, height, PixelFormat::Yuv420p, Duration::ZERO)?;
    Ok(frame.data().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_rgba(width: u32, height: u32, px: [u8; 4]) -> Vec<u8> {
        px.iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect()
    }

    #[test]
    fn test_same_format_shares_payload() {
        let frame = Frame::from_rgba(2, 2, solid_rgba(2, 2, [1, 2, 3, 4]), Duration::ZERO).unwrap();
        let converted = convert(&frame, PixelFormat::Rgba32).unwrap();
        assert!(std::sync::Arc::ptr_eq(&frame.shared_data(), &converted.shared_data()));
    }

    #[test]
    fn test_bgra_swaps_channels() {
        let frame = Frame::from_rgba(1, 1, vec![10, 20, 30, 255], Duration::ZERO).unwrap();
        let bgra = convert(&frame, PixelFormat::Bgra32).unwrap();
        assert_eq!(bgra.data(), &[30, 20, 10, 255]);
        assert_eq!(to_rgba(&bgra), vec![10, 20, 30, 255]);
    }

    #[test]
    fn test_gray_survives_yuv_round_trip() {
        let rgba = solid_rgba(4, 4, [128, 128, 128, 255]);
        for format in [PixelFormat::Yuv420p, PixelFormat::Nv12, PixelFormat::Nv21, PixelFormat::Yuv422] {
            let frame = from_rgba(&rgba, 4, 4, format, Duration::ZERO).unwrap();
            let back = to_rgba(&frame);
            for (a, b) in back.iter().zip(rgba.iter()) {
                assert!((*a as i32 - *b as i32).abs() <= 2, "{format} drifted");
            }
        }
    }

    #[test]
    fn test_odd_dimensions_yuv420p() {
        let rgba = solid_rgba(3, 3, [200, 50, 50, 255]);
        let frame = from_rgba(&rgba, 3, 3, PixelFormat::Yuv420p, Duration::ZERO).unwrap();
        assert_eq!(frame.data().len(), 9 + 2 * 4);
    }

    #[test]
    fn test_odd_width_chroma_pairs() {
        let rgba = solid_rgba(3, 1, [128, 128, 128, 255]);
        for format in [PixelFormat::Yuv422, PixelFormat::Nv12, PixelFormat::Nv21] {
            let frame = from_rgba(&rgba, 3, 1, format, Duration::ZERO).unwrap();
            assert_eq!(frame.stride(), 4, "{format}");
            let back = to_rgba(&frame);
            assert_eq!(back.len(), rgba.len());
            for (a, b) in back.iter().zip(rgba.iter()) {
                assert!((*a as i32 - *b as i32).abs() <= 2, "{format} drifted");
            }
        }
    }

    #[test]
    fn test_odd_width_short_chroma_rejected() {
        // 3 pixels of luma plus a single chroma pair would leave the last pixel without chroma
        let nv12 = Frame::new(3, 1, PixelFormat::Nv12, 3, Duration::ZERO, vec![16u8; 6]);
        assert!(matches!(
            nv12,
            Err(crate::errors::SdkError::Frame(FrameError::StrideTooSmall { minimum: 4, .. }))
        ));
        let yuv422 = Frame::new(3, 1, PixelFormat::Yuv422, 6, Duration::ZERO, vec![16u8; 6]);
        assert!(matches!(
            yuv422,
            Err(crate::errors::SdkError::Frame(FrameError::StrideTooSmall { minimum: 8, .. }))
        ));

        let frame = Frame::new(3, 1, PixelFormat::Yuv422, 8, Duration::ZERO, vec![128u8; 8]).unwrap();
        assert_eq!(to_rgba(&frame).len(), 12);
        let frame = Frame::new(3, 1, PixelFormat::Nv21, 4, Duration::ZERO, vec![128u8; 8]).unwrap();
        assert_eq!(to_rgba(&frame).len(), 12);
    }

    #[test]
    fn test_flip_horizontal() {
        let mut rgba = vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];
        flip_horizontal_rgba(&mut rgba, 2, 2);
        assert_eq!(rgba, vec![2, 2, 2, 2, 1, 1, 1, 1, 4, 4, 4, 4, 3, 3, 3, 3]);
    }

    #[test]
    fn test_scale_rgba_size() {
        let rgba = solid_rgba(4, 2, [9, 9, 9, 255]);
        let scaled = scale_rgba(rgba, 4, 2, 2, 1);
        assert_eq!(scaled.len(), 2 * 1 * 4);
        assert_eq!(&scaled[..4], &[9, 9, 9, 255]);
    }
}
