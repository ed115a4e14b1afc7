// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use lumafx::constants::VideoQuality;
use lumafx::{ConflictStrategy, ProcessingMode, SdkConfig};
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = SdkConfig::default();

    assert!(config.enable_face_detection, "Face detection should be on by default");
    assert!(config.camera.enable_mirroring, "Mirroring should be on by default");
    assert!(config.recording.include_audio, "Audio should be recorded by default");
    assert_eq!(config.processing_mode, ProcessingMode::Live);
    assert_eq!(config.conflict_strategy, ConflictStrategy::AutoStopPrevious);
    assert_eq!(config.recording.video_quality, VideoQuality::High);
}

#[test]
fn test_zero_means_unlimited_or_default() {
    let config = SdkConfig::default();
    assert_eq!(config.recording.max_duration(), None);
    assert_eq!(config.recording.effective_frame_rate(), 30);
    assert_eq!(config.recording.effective_video_size(), (1920, 1080));

    let mut config = SdkConfig::default();
    config.recording.max_duration = 2.5;
    config.recording.video_size = Some((640, 360));
    assert_eq!(config.recording.max_duration(), Some(Duration::from_millis(2500)));
    assert_eq!(config.recording.effective_video_size(), (640, 360));
}

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = SdkConfig::with_api_key("key-123");
    config.processing_mode = ProcessingMode::Hybrid;
    config.conflict_strategy = ConflictStrategy::PriorityBased;
    config.max_cache_size_bytes = 1024;
    config.save(&path).unwrap();

    let loaded = SdkConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_config_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "api_key": "abc", "processing_mode": "offscreen" }"#).unwrap();

    let loaded = SdkConfig::load(&path).unwrap();
    assert_eq!(loaded.api_key, "abc");
    assert_eq!(loaded.processing_mode, ProcessingMode::Offscreen);
    assert!(loaded.enable_face_detection);
    assert!(SdkConfig::load_or_default(&dir.path().join("missing.json")).is_ok());
}
