// SPDX-License-Identifier: GPL-3.0-only

//! Photo encoding
//!
//! - JPEG (with quality control, alpha dropped)
//! - PNG (lossless, alpha kept)
//!
//! Encoding and disk writes run on the blocking pool when called async.

use crate::errors::{SdkError, SdkResult};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supported encoding formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingFormat {
    /// JPEG format (lossy compression)
    #[default]
    Jpeg,
    /// PNG format (lossless compression)
    Png,
}

impl EncodingFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            EncodingFormat::Jpeg => "jpg",
            EncodingFormat::Png => "png",
        }
    }

    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(EncodingFormat::Jpeg),
            "png" => Some(EncodingFormat::Png),
            _ => None,
        }
    }
}

/// Encoding quality settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingQuality {
    Low,
    Medium,
    #[default]
    High,
    Maximum,
}

impl EncodingQuality {
    /// Get JPEG quality value (0-100)
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            EncodingQuality::Low => 60,
            EncodingQuality::Medium => 80,
            EncodingQuality::High => 92,
            EncodingQuality::Maximum => 98,
        }
    }
}

/// Encoded image data ready for saving
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub format: EncodingFormat,
    pub width: u32,
    pub height: u32,
}

/// Photo encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct PhotoEncoder {
    format: EncodingFormat,
    quality: EncodingQuality,
}

impl PhotoEncoder {
    /// JPEG at high quality
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_format(&mut self, format: EncodingFormat) {
        self.format = format;
    }

    /// Only affects JPEG
    pub fn set_quality(&mut self, quality: EncodingQuality) {
        self.quality = quality;
    }

    pub fn format(&self) -> EncodingFormat {
        self.format
    }

    pub fn encode(&self, image: RgbaImage) -> SdkResult<EncodedImage> {
        let (width, height) = image.dimensions();
        let data = match self.format {
            EncodingFormat::Jpeg => Self::encode_jpeg(image, self.quality)?,
            EncodingFormat::Png => Self::encode_png(image)?,
        };
        debug!(size = data.len(), format = ?self.format, "Encoding complete");
        Ok(EncodedImage {
            data,
            format: self.format,
            width,
            height,
        })
    }

    /// Encode on the blocking pool
    pub async fn encode_async(&self, image: RgbaImage) -> SdkResult<EncodedImage> {
        let encoder = *self;
        tokio::task::spawn_blocking(move || encoder.encode(image))
            .await
            .map_err(|e| SdkError::Memory(format!("encoding task failed: {}", e)))?
    }

    /// Write encoded data to `path`, creating parent directories
    pub async fn save(&self, encoded: EncodedImage, path: PathBuf) -> SdkResult<PathBuf> {
        info!(path = %path.display(), "Saving photo");
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> SdkResult<()> {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &encoded.data)?;
            Ok(())
        })
        .await
        .map_err(|e| SdkError::Memory(format!("save task failed: {}", e)))??;
        Ok(path)
    }

    fn encode_jpeg(image: RgbaImage, quality: EncodingQuality) -> SdkResult<Vec<u8>> {
        let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality.jpeg_quality());
        encoder
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
            .map_err(|e| SdkError::InvalidParameter(format!("JPEG encoding failed: {}", e)))?;
        Ok(buffer)
    }

    fn encode_png(image: RgbaImage) -> SdkResult<Vec<u8>> {
        let mut buffer = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| SdkError::InvalidParameter(format!("PNG encoding failed: {}", e)))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_round_trip_keeps_pixels() {
        let image = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut encoder = PhotoEncoder::new();
        encoder.set_format(EncodingFormat::Png);
        let encoded = encoder.encode(image.clone()).unwrap();
        let decoded = image::load_from_memory(&encoded.data).unwrap().to_rgba8();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_jpeg_magic() {
        let encoded = PhotoEncoder::new().encode(RgbaImage::new(8, 8)).unwrap();
        assert_eq!(&encoded.data[..2], &[0xFF, 0xD8]);
        assert_eq!(encoded.format.extension(), "jpg");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(EncodingFormat::from_path(Path::new("a.JPEG")), Some(EncodingFormat::Jpeg));
        assert_eq!(EncodingFormat::from_path(Path::new("a.png")), Some(EncodingFormat::Png));
        assert_eq!(EncodingFormat::from_path(Path::new("a.gif")), None);
    }
}
