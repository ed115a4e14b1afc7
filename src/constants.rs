// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Recording quality presets
///
/// Each preset fixes the default output resolution and the nominal bitrate
/// reported alongside finished recordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoQuality {
    /// 480p, 1 Mbps
    Low,
    /// 720p, 2.5 Mbps
    Medium,
    /// 1080p, 4 Mbps (default)
    #[default]
    High,
    /// 1080p, 8 Mbps
    Ultra,
}

impl VideoQuality {
    /// Get all preset variants, lowest quality first
    pub const ALL: [VideoQuality; 4] = [
        VideoQuality::Low,
        VideoQuality::Medium,
        VideoQuality::High,
        VideoQuality::Ultra,
    ];

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            VideoQuality::Low => "Low",
            VideoQuality::Medium => "Medium",
            VideoQuality::High => "High",
            VideoQuality::Ultra => "Ultra",
        }
    }

    /// Default output size (width, height) for the preset
    pub fn video_size(&self) -> (u32, u32) {
        match self {
            VideoQuality::Low => (854, 480),
            VideoQuality::Medium => (1280, 720),
            VideoQuality::High | VideoQuality::Ultra => (1920, 1080),
        }
    }

    /// Nominal bitrate in kbps
    pub fn bitrate_kbps(&self) -> u32 {
        match self {
            VideoQuality::Low => 1_000,
            VideoQuality::Medium => 2_500,
            VideoQuality::High => 4_000,
            VideoQuality::Ultra => 8_000,
        }
    }
}

/// Frame processing timing
pub mod timing {
    use super::Duration;

    /// How long the processing loop waits on the active source per iteration
    pub const SOURCE_POLL_TIMEOUT: Duration = Duration::from_millis(50);

    /// Sleep used by the processing loop when no source is active
    pub const IDLE_BACKOFF: Duration = Duration::from_millis(10);

    /// Window over which the fps metric is computed
    pub const FPS_WINDOW: Duration = Duration::from_secs(1);

    /// Default frame rate when none is configured
    pub const DEFAULT_FRAME_RATE: u32 = 30;

    /// Default licence validation timeout in seconds
    pub const LICENSE_CHECK_TIMEOUT_SECS: f64 = 10.0;

    /// Log a per-frame summary every N frames when debug logging is enabled
    pub const FRAME_LOG_INTERVAL: u64 = 30;
}

/// Sink delivery queue sizes
pub mod sinks {
    /// Frames buffered per callback lane before new frames are dropped
    pub const CALLBACK_QUEUE_DEPTH: usize = 2;

    /// Frames buffered by an external-data source before new frames are dropped
    pub const EXTERNAL_QUEUE_DEPTH: usize = 4;
}

/// Cloud filter cache defaults
pub mod cache {
    /// Default byte ceiling for decoded filter payloads (64 MiB)
    pub const DEFAULT_MAX_CACHE_BYTES: u64 = 64 * 1024 * 1024;

    /// Chunk size used when reporting download progress
    pub const DOWNLOAD_CHUNK_BYTES: usize = 16 * 1024;

    /// Catalog file name inside a local filter catalog directory
    pub const CATALOG_FILE: &str = "catalog.json";
}

/// Supported file formats
pub mod file_formats {
    /// Supported image file extensions
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

    /// Supported video file extensions (raw YUV4MPEG2 as written by the recorder)
    pub const VIDEO_EXTENSIONS: &[&str] = &["y4m"];

    /// Effect file suffix
    pub const EFFECT_SUFFIX: &str = ".fx.json";

    /// Check if a file extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }

    /// Check if a file extension is a supported video format
    pub fn is_video_extension(ext: &str) -> bool {
        VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Build information
pub mod app_info {
    /// Crate version with build metadata
    pub fn version() -> &'static str {
        env!("LUMAFX_BUILD_VERSION")
    }

    /// Application directory name used under platform config/cache/video dirs
    pub const APP_DIR: &str = "lumafx";
}
