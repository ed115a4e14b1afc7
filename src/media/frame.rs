// SPDX-License-Identifier: GPL-3.0-only

//! Canonical in-memory frame representation

use crate::errors::{FrameError, SdkResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Pixel format of a frame payload
///
/// Packed formats store one plane; `stride` is the row length in bytes.
/// Planar formats (YUV420P, NV12, NV21) store a full resolution luma plane
/// followed by subsampled chroma; `stride` is the luma row length and the
/// chroma strides are derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 32-bit R G B A
    Rgba32,
    /// 32-bit B G R A
    Bgra32,
    /// 24-bit R G B, no alpha
    Rgb24,
    /// Planar 4:2:0 (Y plane, U plane, V plane)
    Yuv420p,
    /// Semi-planar 4:2:0 (Y plane + interleaved UV)
    Nv12,
    /// Semi-planar 4:2:0 (Y plane + interleaved VU)
    Nv21,
    /// 8-bit single channel
    Grayscale,
    /// Packed 4:2:2 (Y0 U Y1 V)
    Yuv422,
}

impl PixelFormat {
    /// All supported formats
    pub const ALL: [PixelFormat; 8] = [
        PixelFormat::Rgba32,
        PixelFormat::Bgra32,
        PixelFormat::Rgb24,
        PixelFormat::Yuv420p,
        PixelFormat::Nv12,
        PixelFormat::Nv21,
        PixelFormat::Grayscale,
        PixelFormat::Yuv422,
    ];

    /// Average bytes per pixel (accounting for chroma subsampling)
    pub fn bytes_per_pixel(&self) -> f32 {
        match self {
            Self::Rgba32 | Self::Bgra32 => 4.0,
            Self::Rgb24 => 3.0,
            Self::Yuv422 => 2.0,
            Self::Yuv420p | Self::Nv12 | Self::Nv21 => 1.5,
            Self::Grayscale => 1.0,
        }
    }

    /// Bytes per pixel in the row addressed by `stride`
    ///
    /// For planar formats this is the luma plane.
    pub fn row_bytes_per_pixel(&self) -> u32 {
        match self {
            Self::Rgba32 | Self::Bgra32 => 4,
            Self::Rgb24 => 3,
            Self::Yuv422 => 2,
            Self::Yuv420p | Self::Nv12 | Self::Nv21 | Self::Grayscale => 1,
        }
    }

    /// Check if this is a YUV format
    pub fn is_yuv(&self) -> bool {
        matches!(
            self,
            Self::Yuv420p | Self::Nv12 | Self::Nv21 | Self::Yuv422
        )
    }

    /// Check if the payload is split into luma and chroma planes
    pub fn is_planar(&self) -> bool {
        matches!(self, Self::Yuv420p | Self::Nv12 | Self::Nv21)
    }

    /// Minimum stride for a row of `width` pixels
    ///
    /// Packed 4:2:2 rows and NV12/NV21 chroma rows hold whole chroma pairs,
    /// so odd widths round up to the next pair.
    pub fn min_stride(&self, width: u32) -> u32 {
        match self {
            Self::Yuv422 => width.div_ceil(2) * 4,
            Self::Nv12 | Self::Nv21 => width.div_ceil(2) * 2,
            _ => width * self.row_bytes_per_pixel(),
        }
    }

    /// Stride of the chroma plane(s) for planar formats
    pub fn chroma_stride(&self, stride: u32) -> u32 {
        match self {
            Self::Yuv420p => stride.div_ceil(2),
            Self::Nv12 | Self::Nv21 => stride,
            _ => 0,
        }
    }

    /// Minimum payload size for the given geometry
    pub fn required_len(&self, width: u32, height: u32, stride: u32) -> usize {
        let h = height as usize;
        let stride = stride as usize;
        let chroma_rows = (height as usize).div_ceil(2);
        match self {
            Self::Yuv420p => {
                let chroma_stride = self.chroma_stride(stride as u32) as usize;
                stride * h + 2 * chroma_stride * chroma_rows
            }
            Self::Nv12 | Self::Nv21 => stride * h + stride * chroma_rows,
            _ => {
                let row = self.min_stride(width) as usize;
                stride * h.saturating_sub(1) + row
            }
        }
    }

    /// Infer a format from payload size, used for auto-detected external input
    ///
    /// 4 bytes/pixel is assumed RGBA, 2 bytes/pixel packed 4:2:2. Sizes that
    /// fit more than one layout (a 1x1 frame of 3 bytes is both RGB24 and
    /// YUV420P) are ambiguous and yield `None`.
    pub fn infer(width: u32, height: u32, len: usize) -> Option<Self> {
        let pixels = width as usize * height as usize;
        if pixels == 0 {
            return None;
        }
        let chroma = (width as usize).div_ceil(2) * (height as usize).div_ceil(2);
        let packed_422 = (width as usize).div_ceil(2) * 4 * height as usize;
        let candidates = [
            (pixels * 4, Self::Rgba32),
            (pixels * 3, Self::Rgb24),
            (packed_422, Self::Yuv422),
            (pixels + 2 * chroma, Self::Yuv420p),
            (pixels, Self::Grayscale),
        ];
        let mut matches = candidates.iter().filter(|(size, _)| *size == len).map(|(_, format)| *format);
        match (matches.next(), matches.next()) {
            (Some(format), None) => Some(format),
            _ => None,
        }
    }

    /// Parse a format name ("rgba", "nv12", "i420", ...)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rgba" | "rgba32" => Some(Self::Rgba32),
            "bgra" | "bgra32" => Some(Self::Bgra32),
            "rgb" | "rgb24" => Some(Self::Rgb24),
            "yuv420p" | "i420" => Some(Self::Yuv420p),
            "nv12" => Some(Self::Nv12),
            "nv21" => Some(Self::Nv21),
            "gray" | "gray8" | "grayscale" => Some(Self::Grayscale),
            "yuv422" | "yuyv" | "yuy2" => Some(Self::Yuv422),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Rgba32 => "RGBA32",
            Self::Bgra32 => "BGRA32",
            Self::Rgb24 => "RGB24",
            Self::Yuv420p => "YUV420P",
            Self::Nv12 => "NV12",
            Self::Nv21 => "NV21",
            Self::Grayscale => "GRAY8",
            Self::Yuv422 => "YUV422",
        };
        write!(f, "{}", name)
    }
}

/// A single immutable video frame
///
/// The payload is reference counted, so cloning a frame to hand it to several
/// sinks never copies pixels.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    stride: u32,
    timestamp: Duration,
    data: Arc<[u8]>,
}

impl Frame {
    /// Build a validated frame
    ///
    /// Fails with [`FrameError`] when width or height is zero, the stride is
    /// shorter than a row, or the payload does not cover the geometry.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        stride: u32,
        timestamp: Duration,
        data: impl Into<Arc<[u8]>>,
    ) -> SdkResult<Self> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidDimensions { width, height }.into());
        }

        let minimum = format.min_stride(width);
        if stride < minimum {
            return Err(FrameError::StrideTooSmall { stride, minimum }.into());
        }

        let data = data.into();
        let expected = format.required_len(width, height, stride);
        if data.len() < expected {
            return Err(FrameError::PayloadTooShort {
                length: data.len(),
                expected,
            }
            .into());
        }

        Ok(Self {
            width,
            height,
            format,
            stride,
            timestamp,
            data,
        })
    }

    /// Build a tightly packed RGBA frame
    pub fn from_rgba(
        width: u32,
        height: u32,
        rgba: impl Into<Arc<[u8]>>,
        timestamp: Duration,
    ) -> SdkResult<Self> {
        Self::new(
            width,
            height,
            PixelFormat::Rgba32,
            width * 4,
            timestamp,
            rgba,
        )
    }

    /// Same pixels, different presentation timestamp
    pub fn with_timestamp(&self, timestamp: Duration) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Presentation timestamp
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Raw payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the payload
    pub fn shared_data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// Number of pixels in the frame
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Byte offsets of the chroma planes for planar formats: (first, second, stride)
    ///
    /// YUV420P returns (U, V); NV12/NV21 return the interleaved plane twice.
    pub fn chroma_planes(&self) -> Option<(usize, usize, usize)> {
        let luma_size = self.stride as usize * self.height as usize;
        let chroma_stride = self.format.chroma_stride(self.stride) as usize;
        let chroma_rows = (self.height as usize).div_ceil(2);
        match self.format {
            PixelFormat::Yuv420p => Some((
                luma_size,
                luma_size + chroma_stride * chroma_rows,
                chroma_stride,
            )),
            PixelFormat::Nv12 | PixelFormat::Nv21 => Some((luma_size, luma_size, chroma_stride)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SdkError;

    #[test]
    fn test_rejects_zero_dimensions() {
        let result = Frame::new(0, 4, PixelFormat::Rgba32, 16, Duration::ZERO, vec![0u8; 64]);
        assert!(matches!(
            result,
            Err(SdkError::Frame(FrameError::InvalidDimensions { .. }))
        ));
    }

    #[test]
    fn test_rejects_short_stride() {
        let result = Frame::new(4, 4, PixelFormat::Rgba32, 12, Duration::ZERO, vec![0u8; 64]);
        assert!(matches!(
            result,
            Err(SdkError::Frame(FrameError::StrideTooSmall { minimum: 16, .. }))
        ));
    }

    #[test]
    fn test_rejects_short_payload() {
        let result = Frame::new(4, 4, PixelFormat::Nv12, 4, Duration::ZERO, vec![0u8; 20]);
        assert!(matches!(
            result,
            Err(SdkError::Frame(FrameError::PayloadTooShort { expected: 24, .. }))
        ));
    }

    #[test]
    fn test_padded_stride_accepted() {
        // 3 pixels of RGB24 per row padded to 16 bytes; last row may be tight
        let frame = Frame::new(3, 2, PixelFormat::Rgb24, 16, Duration::ZERO, vec![0u8; 25]).unwrap();
        assert_eq!(frame.pixel_count(), 6);
    }

    #[test]
    fn test_infer_formats() {
        assert_eq!(PixelFormat::infer(4, 4, 64), Some(PixelFormat::Rgba32));
        assert_eq!(PixelFormat::infer(4, 4, 24), Some(PixelFormat::Yuv420p));
        assert_eq!(PixelFormat::infer(4, 4, 16), Some(PixelFormat::Grayscale));
        assert_eq!(PixelFormat::infer(4, 4, 17), None);
    }

    #[test]
    fn test_infer_ambiguous_sizes() {
        // 1x1: 3 bytes is RGB24 and YUV420P
        assert_eq!(PixelFormat::infer(1, 1, 3), None);
        // 2x1: 4 bytes is packed 4:2:2 and YUV420P
        assert_eq!(PixelFormat::infer(2, 1, 4), None);
        assert_eq!(PixelFormat::infer(2, 2, 16), Some(PixelFormat::Rgba32));
        assert_eq!(PixelFormat::infer(3, 1, 8), Some(PixelFormat::Yuv422));
    }

    #[test]
    fn test_yuv420p_plane_offsets() {
        let frame = Frame::new(4, 4, PixelFormat::Yuv420p, 4, Duration::ZERO, vec![0u8; 24]).unwrap();
        assert_eq!(frame.chroma_planes(), Some((16, 20, 2)));
    }
}
