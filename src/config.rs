// SPDX-License-Identifier: GPL-3.0-only

//! SDK configuration
//!
//! Persisted as JSON; unknown fields are ignored and missing fields take their
//! defaults so older files keep loading.

use crate::backends::ConflictStrategy;
use crate::backends::camera::{CameraPosition, FlashMode, SessionPreset, VideoOrientation};
use crate::constants::app_info::APP_DIR;
use crate::constants::timing::{DEFAULT_FRAME_RATE, LICENSE_CHECK_TIMEOUT_SECS};
use crate::constants::{VideoQuality, cache::DEFAULT_MAX_CACHE_BYTES};
use crate::errors::SdkResult;
use crate::pipelines::ProcessingMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Current on-disk configuration version
pub const CONFIG_VERSION: u32 = 1;

/// Camera capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: CameraPosition,
    pub session_preset: SessionPreset,
    pub frame_rate: u32,
    pub orientation: VideoOrientation,
    /// Mirror front camera frames horizontally (selfie mode)
    pub enable_mirroring: bool,
    pub flash_mode: FlashMode,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: CameraPosition::Front,
            session_preset: SessionPreset::default(),
            frame_rate: DEFAULT_FRAME_RATE,
            orientation: VideoOrientation::default(),
            enable_mirroring: true,
            flash_mode: FlashMode::Off,
        }
    }
}

/// Recording sink settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub video_quality: VideoQuality,
    pub include_audio: bool,
    /// Seconds, 0 means unlimited
    pub max_duration: f64,
    /// Bytes, 0 means unlimited
    pub max_file_size_bytes: u64,
    /// Where recordings land, the platform videos directory when `None`
    pub output_directory: Option<PathBuf>,
    /// Output size, the quality preset size when `None`
    pub video_size: Option<(u32, u32)>,
    /// 0 means the default frame rate
    pub frame_rate: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            video_quality: VideoQuality::default(),
            include_audio: true,
            max_duration: 0.0,
            max_file_size_bytes: 0,
            output_directory: None,
            video_size: None,
            frame_rate: 0,
        }
    }
}

impl RecordingConfig {
    pub fn effective_video_size(&self) -> (u32, u32) {
        self.video_size.unwrap_or_else(|| self.video_quality.video_size())
    }

    pub fn effective_frame_rate(&self) -> u32 {
        if self.frame_rate == 0 {
            DEFAULT_FRAME_RATE
        } else {
            self.frame_rate
        }
    }

    /// `None` when unlimited
    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration.is_finite() && self.max_duration > 0.0).then(|| Duration::from_secs_f64(self.max_duration))
    }
}

/// Top-level SDK configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    pub version: u32,
    pub api_key: String,
    pub enable_debug_logging: bool,
    pub enable_face_detection: bool,
    /// Seconds
    pub license_check_timeout: f64,
    /// Cloud filter download directory, the platform cache directory when `None`
    pub cloud_filter_cache_path: Option<PathBuf>,
    pub max_cache_size_bytes: u64,
    pub automatic_cache_cleanup: bool,
    pub conflict_strategy: ConflictStrategy,
    pub processing_mode: ProcessingMode,
    pub camera: CameraConfig,
    pub recording: RecordingConfig,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api_key: String::new(),
            enable_debug_logging: false,
            enable_face_detection: true,
            license_check_timeout: LICENSE_CHECK_TIMEOUT_SECS,
            cloud_filter_cache_path: None,
            max_cache_size_bytes: DEFAULT_MAX_CACHE_BYTES,
            automatic_cache_cleanup: true,
            conflict_strategy: ConflictStrategy::default(),
            processing_mode: ProcessingMode::default(),
            camera: CameraConfig::default(),
            recording: RecordingConfig::default(),
        }
    }
}

impl SdkConfig {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Validation timeout, falling back to the default for nonsense values
    pub fn license_timeout(&self) -> Duration {
        if self.license_check_timeout.is_finite() && self.license_check_timeout > 0.0 {
            Duration::from_secs_f64(self.license_check_timeout)
        } else {
            Duration::from_secs_f64(LICENSE_CHECK_TIMEOUT_SECS)
        }
    }

    /// Cloud filter cache directory, resolved against the platform cache dir
    pub fn cache_dir(&self) -> PathBuf {
        self.cloud_filter_cache_path.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR)
                .join("filters")
        })
    }

    /// Recording output directory, resolved against the platform videos dir
    pub fn recording_dir(&self) -> PathBuf {
        self.recording
            .output_directory
            .clone()
            .unwrap_or_else(crate::storage::default_videos_dir)
    }

    /// Default config file location under the platform config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
    }

    pub fn load(path: &Path) -> SdkResult<Self> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), version = config.version, "Loaded configuration");
        Ok(config)
    }

    /// Load from `path`, or the defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> SdkResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> SdkResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}
