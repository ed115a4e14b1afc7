// SPDX-License-Identifier: GPL-3.0-only

//! Photo capture
//!
//! ```text
//! last processed frame → RGBA image → Encoding → Disk I/O
//! ```
//!
//! The processing loop keeps running while a photo is encoded and written.

pub mod encoding;

pub use encoding::{EncodedImage, EncodingFormat, EncodingQuality, PhotoEncoder};

use crate::errors::{FrameError, SdkResult};
use crate::media::{Frame, convert};
use image::RgbaImage;
use std::path::PathBuf;

/// Convert any frame into an RGBA image
pub fn frame_to_image(frame: &Frame) -> SdkResult<RgbaImage> {
    let rgba = convert::to_rgba(frame);
    let expected = frame.pixel_count() * 4;
    let length = rgba.len();
    RgbaImage::from_raw(frame.width(), frame.height(), rgba)
        .ok_or_else(|| FrameError::PayloadTooShort { length, expected }.into())
}

/// Encode-and-save workflow for captured frames
#[derive(Debug, Clone, Copy, Default)]
pub struct PhotoPipeline {
    encoder: PhotoEncoder,
}

impl PhotoPipeline {
    pub fn new(encoder: PhotoEncoder) -> Self {
        Self { encoder }
    }

    /// Save `frame` to `path`, choosing the format from the extension
    pub async fn save(&self, frame: &Frame, path: PathBuf) -> SdkResult<PathBuf> {
        let mut encoder = self.encoder;
        if let Some(format) = EncodingFormat::from_path(&path) {
            encoder.set_format(format);
        }
        let image = frame_to_image(frame)?;
        let encoded = encoder.encode_async(image).await?;
        encoder.save(encoded, path).await
    }
}
